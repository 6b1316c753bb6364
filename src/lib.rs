pub use dnswire::{
    parse, write_packet, DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryClass, QueryType,
    ResponseCode,
};
use std::net::Ipv4Addr;

mod forwarder;
mod server;

pub use forwarder::{error_response, Forwarder, ForwarderConfig, DEFAULT_TIMEOUT};
pub use server::{run_tcp_listener, run_udp_listener, TCP_IO_TIMEOUT};

// Largest message read from a socket, EDNS sized.
pub const MAX_PACKET_SIZE: usize = 4096;
pub const RECURSIVE_DNS_SERVER: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 53);
