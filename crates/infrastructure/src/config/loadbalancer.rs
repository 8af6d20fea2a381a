//! Load balancer and connection tracking configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

use domain::conntrack::entity::ConntrackSettings;
use domain::loadbalancer::entity::BackendSpec;
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, validation};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerConfig {
    /// Seconds between two conntrack reconciliation passes.
    #[serde(default = "default_conntrack_interval")]
    pub conntrack_interval_secs: u64,

    #[serde(default)]
    pub gc: GcConfig,

    /// Upper bound on the neighbor probe run before a backend is resolved.
    #[serde(default = "default_probe_timeout")]
    pub neighbor_probe_timeout_ms: u64,

    /// Backends registered at startup, in rotation order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            conntrack_interval_secs: default_conntrack_interval(),
            gc: GcConfig::default(),
            neighbor_probe_timeout_ms: default_probe_timeout(),
            backends: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Idle seconds after which a UDP flow is purged.
    #[serde(default = "default_gc_lifetime")]
    pub lifetime_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lifetime_secs: default_gc_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub name: String,
    pub addr: Ipv4Addr,
    #[serde(default)]
    pub health_check: String,
}

fn default_conntrack_interval() -> u64 {
    1
}

fn default_gc_lifetime() -> u64 {
    3600
}

fn default_probe_timeout() -> u64 {
    1000
}

impl LoadBalancerConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        self.conntrack_settings()
            .validate()
            .map_err(|e| validation("loadbalancer", e))?;
        if self.neighbor_probe_timeout_ms == 0 {
            return Err(validation(
                "loadbalancer.neighbor_probe_timeout_ms",
                "must be greater than 0",
            ));
        }
        for (idx, backend) in self.backends.iter().enumerate() {
            backend
                .to_spec()
                .validate()
                .map_err(|e| validation(format!("loadbalancer.backends[{idx}]"), e))?;
        }
        Ok(())
    }

    pub fn conntrack_settings(&self) -> ConntrackSettings {
        ConntrackSettings {
            interval_secs: self.conntrack_interval_secs,
            gc_enabled: self.gc.enabled,
            gc_lifetime_secs: self.gc.lifetime_secs,
        }
    }

    pub fn neighbor_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.neighbor_probe_timeout_ms)
    }
}

impl BackendConfig {
    pub fn to_spec(&self) -> BackendSpec {
        BackendSpec {
            name: self.name.clone(),
            addr: self.addr,
            health_check: self.health_check.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daemon_defaults() {
        let cfg = LoadBalancerConfig::default();
        assert_eq!(cfg.conntrack_settings(), ConntrackSettings::default());
        assert_eq!(cfg.neighbor_probe_timeout(), Duration::from_secs(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = LoadBalancerConfig {
            conntrack_interval_secs: 0,
            ..LoadBalancerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_probe_timeout_is_rejected() {
        let cfg = LoadBalancerConfig {
            neighbor_probe_timeout_ms: 0,
            ..LoadBalancerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("neighbor_probe_timeout_ms"));
    }

    #[test]
    fn broadcast_backend_is_rejected() {
        let cfg = LoadBalancerConfig {
            backends: vec![BackendConfig {
                name: "b0".to_string(),
                addr: Ipv4Addr::BROADCAST,
                health_check: String::new(),
            }],
            ..LoadBalancerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("loadbalancer.backends[0]"));
    }
}
