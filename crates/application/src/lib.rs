#![forbid(unsafe_code)]

pub mod ddos_service_impl;
pub mod firewall_service_impl;
pub mod lb_service_impl;
pub mod stat_service_impl;
