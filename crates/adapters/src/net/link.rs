use anyhow::Context;
use domain::common::entity::MacAddr;

/// Get interface index by name.
pub fn ifindex(name: &str) -> Result<u32, anyhow::Error> {
    nix::net::if_::if_nametoindex(name)
        .with_context(|| format!("failed to get index for interface '{name}'"))
}

/// Hardware address of the interface `name`.
pub fn mac_address(name: &str) -> Result<MacAddr, anyhow::Error> {
    let addrs = nix::ifaddrs::getifaddrs().context("getifaddrs failed")?;
    addrs
        .filter(|ifa| ifa.interface_name == name)
        .find_map(|ifa| ifa.address.as_ref()?.as_link_addr()?.addr())
        .map(MacAddr)
        .ok_or_else(|| anyhow::anyhow!("interface '{name}' has no link-layer address"))
}
