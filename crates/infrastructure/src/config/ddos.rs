//! DoS protection policies installed at startup.

use domain::common::entity::{TcpFlag, TransportProtocol};
use domain::ddos::entity::DosPolicy;
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, validation};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DosProtectionConfig {
    #[serde(default)]
    pub policies: Vec<DosPolicyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DosPolicyConfig {
    /// `icmp`, `tcp` or `udp`.
    pub protocol: String,

    /// TCP control flag counted by the policy. Only valid for `tcp`.
    #[serde(default)]
    pub flag: Option<String>,

    /// Packets allowed per source and poll interval.
    pub limit: u64,
}

impl DosPolicyConfig {
    pub(super) fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        self.to_domain_policy_at(&format!("dos_protection.policies[{idx}]"))
            .map(drop)
    }

    pub fn to_domain_policy(&self) -> Result<DosPolicy, ConfigError> {
        self.to_domain_policy_at("dos_protection.policies")
    }

    fn to_domain_policy_at(&self, prefix: &str) -> Result<DosPolicy, ConfigError> {
        let protocol: TransportProtocol = self
            .protocol
            .parse()
            .map_err(|e| validation(format!("{prefix}.protocol"), e))?;
        let flag = self
            .flag
            .as_deref()
            .map(str::parse::<TcpFlag>)
            .transpose()
            .map_err(|e| validation(format!("{prefix}.flag"), e))?;

        let policy = DosPolicy::new(protocol, flag, self.limit);
        policy.validate().map_err(|e| validation(prefix, e))?;
        Ok(policy)
    }
}
