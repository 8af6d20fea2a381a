use std::time::Duration;

// ── Paths ──────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/xdplb/config.yaml";

/// Compiled eBPF object carrying the six XDP programs.
pub const DEFAULT_EBPF_PROGRAM_PATH: &str = "/usr/local/lib/xdplb/xdplb";

// ── Intervals ──────────────────────────────────────────────────────

/// Period of the upstream packet counter log line.
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

// ── Timeouts ───────────────────────────────────────────────────────

/// Upper bound on waiting for the background loops to stop.
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_absolute() {
        assert!(DEFAULT_CONFIG_PATH.starts_with('/'));
        assert!(DEFAULT_EBPF_PROGRAM_PATH.starts_with('/'));
    }

    #[test]
    fn shutdown_timeout_is_reasonable() {
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() >= 1);
        assert!(GRACEFUL_SHUTDOWN_TIMEOUT.as_secs() <= 30);
    }
}
