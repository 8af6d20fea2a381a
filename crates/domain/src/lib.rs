#![forbid(unsafe_code)]

pub mod common;
pub mod conntrack;
pub mod ddos;
pub mod firewall;
pub mod loadbalancer;
