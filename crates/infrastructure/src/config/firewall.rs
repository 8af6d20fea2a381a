//! Startup firewall rules.

use domain::common::entity::TransportProtocol;
use domain::firewall::entity::{FwRule, Ipv4Network, PortRange};
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, validation};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirewallConfig {
    #[serde(default)]
    pub rules: Vec<FirewallRuleConfig>,
}

// ── Firewall rule config (YAML-friendly) ───────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirewallRuleConfig {
    /// `a.b.c.d/len`, or a bare address for a single host.
    pub network: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// `N` or `N-M`.
    #[serde(default)]
    pub src_ports: Option<String>,

    #[serde(default)]
    pub dst_ports: Option<String>,
}

fn default_protocol() -> String {
    "any".to_string()
}

impl FirewallRuleConfig {
    pub(super) fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        self.to_domain_rule_at(&format!("firewall.rules[{idx}]"))
            .map(drop)
    }

    /// Convert to a domain `FwRule` ready to be installed.
    pub fn to_domain_rule(&self) -> Result<FwRule, ConfigError> {
        self.to_domain_rule_at("firewall.rules")
    }

    fn to_domain_rule_at(&self, prefix: &str) -> Result<FwRule, ConfigError> {
        let network = parse_network(&self.network).map_err(|reason| {
            ConfigError::InvalidAddress {
                field: format!("{prefix}.network"),
                value: self.network.clone(),
                reason,
            }
        })?;
        let protocol: TransportProtocol = self
            .protocol
            .parse()
            .map_err(|e| validation(format!("{prefix}.protocol"), e))?;
        let src_ports = parse_ports(self.src_ports.as_deref(), &format!("{prefix}.src_ports"))?;
        let dst_ports = parse_ports(self.dst_ports.as_deref(), &format!("{prefix}.dst_ports"))?;

        let rule = FwRule::new(network, src_ports, dst_ports, protocol);
        rule.validate().map_err(|e| validation(prefix, e))?;
        Ok(rule)
    }
}

fn parse_network(value: &str) -> Result<Ipv4Network, String> {
    if value.contains('/') {
        value.parse().map_err(|e| format!("{e}"))
    } else {
        value
            .parse()
            .map(Ipv4Network::host)
            .map_err(|e| format!("{e}"))
    }
}

fn parse_ports(value: Option<&str>, field: &str) -> Result<PortRange, ConfigError> {
    value.map_or(Ok(PortRange::ANY), |v| {
        v.parse().map_err(|e| validation(field, e))
    })
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn rule(network: &str, protocol: &str) -> FirewallRuleConfig {
        FirewallRuleConfig {
            network: network.to_string(),
            protocol: protocol.to_string(),
            src_ports: None,
            dst_ports: None,
        }
    }

    #[test]
    fn converts_cidr_and_ports() {
        let cfg = FirewallRuleConfig {
            dst_ports: Some("80-443".to_string()),
            ..rule("10.0.0.0/8", "TCP")
        };
        let r = cfg.to_domain_rule().unwrap();
        assert_eq!(r.network.to_string(), "10.0.0.0/8");
        assert_eq!(r.protocol, TransportProtocol::Tcp);
        assert_eq!(r.dst_ports, PortRange { start: 80, end: 443 });
        assert!(r.src_ports.is_any());
    }

    #[test]
    fn bare_address_is_a_host_rule() {
        let r = rule("198.51.100.7", "any").to_domain_rule().unwrap();
        assert_eq!(r.network, Ipv4Network::host(Ipv4Addr::new(198, 51, 100, 7)));
    }

    #[test]
    fn invalid_network_is_an_address_error() {
        let err = rule("10.0.0.0/33", "tcp").validate(2).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidAddress { ref field, .. } if field == "firewall.rules[2].network")
        );
        assert!(rule("not-an-ip", "tcp").to_domain_rule().is_err());
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let err = rule("10.0.0.0/8", "sctp").validate(0).unwrap_err();
        assert!(err.to_string().contains("firewall.rules[0].protocol"));
    }

    #[test]
    fn both_port_ranges_are_rejected() {
        let cfg = FirewallRuleConfig {
            src_ports: Some("1".to_string()),
            dst_ports: Some("2".to_string()),
            ..rule("10.0.0.0/8", "udp")
        };
        assert!(cfg.validate(0).is_err());
    }

    #[test]
    fn malformed_port_range_is_rejected() {
        let cfg = FirewallRuleConfig {
            dst_ports: Some("443-80".to_string()),
            ..rule("10.0.0.0/8", "tcp")
        };
        let err = cfg.validate(1).unwrap_err();
        assert!(err.to_string().contains("firewall.rules[1].dst_ports"));
    }
}
