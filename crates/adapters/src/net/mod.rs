pub mod arp;
pub mod link;
