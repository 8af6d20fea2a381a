pub mod conntrack_map_port;
pub mod dos_counter_port;
pub mod firewall_map_port;
pub mod loadbalancer_map_port;
pub mod neighbor_port;
pub mod packet_counter_port;
pub mod xdp_attach_port;
