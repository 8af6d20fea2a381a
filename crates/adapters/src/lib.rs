#![deny(unsafe_code)]

pub mod ebpf;
pub mod net;
