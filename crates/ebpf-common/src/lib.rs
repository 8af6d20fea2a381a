#![cfg_attr(not(feature = "std"), no_std)]

pub mod conntrack;
pub mod counter;
pub mod ddos;
pub mod firewall;
pub mod loadbalancer;
pub mod programs;
