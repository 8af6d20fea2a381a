#![no_main]

use libfuzzer_sys::fuzz_target;

use infrastructure::config::AgentConfig;

// Any YAML accepted by the parser must convert cleanly into domain objects.
fuzz_target!(|data: &[u8]| {
    let Ok(yaml) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = AgentConfig::from_yaml(yaml) else {
        return;
    };
    for rule in &config.firewall.rules {
        assert!(rule.to_domain_rule().is_ok());
    }
    for policy in &config.dos_protection.policies {
        assert!(policy.to_domain_policy().is_ok());
    }
    assert!(config.loadbalancer.conntrack_settings().validate().is_ok());
});
