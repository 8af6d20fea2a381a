//! Shared error type and helpers used across the config modules.

use std::path::Path;

use tracing::warn;

// ── Limits ─────────────────────────────────────────────────────────

/// Rule ids are stored as `u16` in the kernel matcher.
pub(super) const MAX_FIREWALL_RULES: usize = u16::MAX as usize;
pub(super) const MAX_DOS_POLICIES: usize = 256;
pub(super) const MAX_BACKENDS: usize = ebpf_common::loadbalancer::RR_TABLE_MAX_ENTRIES as usize;

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("invalid address '{value}' for field '{field}': {reason}")]
    InvalidAddress {
        field: String,
        value: String,
        reason: String,
    },

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

#[cfg(unix)]
pub(super) fn warn_if_world_writable(path: &Path, label: &str) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o002 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:04o}"),
                "{label} is world-writable, consider chmod 644 or stricter",
            );
        }
    }
}

#[cfg(not(unix))]
pub(super) fn warn_if_world_writable(_path: &Path, _label: &str) {}

pub(super) fn check_limit(field: &str, count: usize, max: usize) -> Result<(), ConfigError> {
    if count > max {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("count {count} exceeds maximum {max}"),
        });
    }
    Ok(())
}

pub(super) fn validation(field: impl Into<String>, message: impl ToString) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_limit_accepts_boundary() {
        assert!(check_limit("firewall.rules", 10, 10).is_ok());
        let err = check_limit("firewall.rules", 11, 10).unwrap_err();
        assert!(err.to_string().contains("firewall.rules"));
        assert!(err.to_string().contains("exceeds maximum 10"));
    }

    #[test]
    fn yaml_error_converts() {
        let err: ConfigError = serde_yaml_ng::from_str::<u32>("[").unwrap_err().into();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn backend_limit_matches_rotation_table() {
        assert_eq!(MAX_BACKENDS, 64);
    }
}
