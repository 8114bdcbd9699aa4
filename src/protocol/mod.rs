//! Network protocol implementations
//!
//! Parsers are zero-copy views over captured bytes; builders produce the
//! frames the controller injects.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;
