//! Minimal IPv6 stack: just enough IPv6, ICMPv6 and UDP to boot over.
//!
//! Addresses are derived from the interface MAC, neighbor solicitations and
//! echo requests are answered in place, and UDP datagrams are handed to the
//! port dispatcher. There is no routing, fragmentation or extension header
//! support.
//!
//! # Reference
//! RFC 8200, RFC 4443, RFC 4861

pub mod addr;
pub mod checksum;
pub mod header;
pub mod cache;
pub mod ndp;
pub mod stack;

pub use addr::{link_local, multicast_mac, solicited_node, unique_local, ALL_NODES};
pub use cache::{MacCache, MacCacheEntry};
pub use checksum::{calculate_checksum, upper_layer_checksum, Checksum};
pub use header::{UDP6_MAX_PAYLOAD, UPPER_OFFSET};
pub use stack::{Inet6, Inet6Stats, Outbound, UdpDatagram, UdpSink};
