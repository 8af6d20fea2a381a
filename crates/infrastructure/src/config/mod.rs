//! Agent configuration: structs, parsing, and validation.
//!
//! - `common`: `ConfigError` and shared helpers
//! - `firewall`, `ddos`, `loadbalancer`: per-component sections

mod common;
mod ddos;
mod firewall;
mod loadbalancer;

pub use common::ConfigError;
pub use ddos::{DosPolicyConfig, DosProtectionConfig};
pub use firewall::{FirewallConfig, FirewallRuleConfig};
pub use loadbalancer::{BackendConfig, GcConfig, LoadBalancerConfig};

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EBPF_PROGRAM_PATH;
use common::{
    MAX_BACKENDS, MAX_DOS_POLICIES, MAX_FIREWALL_RULES, check_limit, validation,
    warn_if_world_writable,
};

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub agent: AgentInfo,

    #[serde(default)]
    pub loadbalancer: LoadBalancerConfig,

    #[serde(default)]
    pub firewall: FirewallConfig,

    #[serde(default)]
    pub dos_protection: DosProtectionConfig,
}

impl AgentConfig {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        warn_if_world_writable(path, "config file");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.upstream.trim().is_empty() {
            return Err(validation(
                "agent.upstream",
                "an upstream interface is required",
            ));
        }
        let vip = self.agent.vip;
        if vip.is_unspecified() || vip.is_broadcast() || vip.is_multicast() {
            return Err(ConfigError::InvalidAddress {
                field: "agent.vip".to_string(),
                value: vip.to_string(),
                reason: "must be a unicast address".to_string(),
            });
        }

        check_limit(
            "firewall.rules",
            self.firewall.rules.len(),
            MAX_FIREWALL_RULES,
        )?;
        check_limit(
            "dos_protection.policies",
            self.dos_protection.policies.len(),
            MAX_DOS_POLICIES,
        )?;
        check_limit(
            "loadbalancer.backends",
            self.loadbalancer.backends.len(),
            MAX_BACKENDS,
        )?;

        self.loadbalancer.validate()?;
        for (idx, rule) in self.firewall.rules.iter().enumerate() {
            rule.validate(idx)?;
        }
        for (idx, policy) in self.dos_protection.policies.iter().enumerate() {
            policy.validate(idx)?;
        }
        Ok(())
    }

    /// Path of the compiled eBPF object.
    pub fn ebpf_program_path(&self) -> PathBuf {
        self.agent
            .ebpf_program_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EBPF_PROGRAM_PATH))
    }
}

// ── Agent info ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInfo {
    /// Interface facing clients; the XDP entrypoint is attached here.
    pub upstream: String,

    /// Virtual IPv4 address clients connect to.
    pub vip: Ipv4Addr,

    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    #[serde(default)]
    pub ebpf_program_path: Option<PathBuf>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}
