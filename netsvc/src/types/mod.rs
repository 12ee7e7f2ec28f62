//! Shared data types module.
//!
//! Link-layer definitions plus the IPv6 address type used throughout the
//! stack.

pub mod ethernet;

pub use ethernet::{
    EthernetHeader, MacAddress, ETH_ALEN, ETH_BUFFER_SIZE, ETH_FRAME_MAX, ETH_HLEN, ETH_MTU,
    ETH_P_IPV6,
};
pub use smoltcp::wire::Ipv6Address;
