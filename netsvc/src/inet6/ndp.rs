//! ICMPv6 message bodies: neighbor discovery, echo, router advertisement.
//!
//! Builders return the full ICMPv6 message with a zero checksum; the stack
//! fills the checksum in when it sends.
//!
//! # Reference
//! RFC 4861 §4, RFC 4443 §4

use crate::types::{Ipv6Address, MacAddress};

pub const ICMP6_ECHO_REQUEST: u8 = 128;
pub const ICMP6_ECHO_REPLY: u8 = 129;
pub const ICMP6_ROUTER_SOLICIT: u8 = 133;
pub const ICMP6_ROUTER_ADVERT: u8 = 134;
pub const ICMP6_NEIGHBOR_SOLICIT: u8 = 135;
pub const ICMP6_NEIGHBOR_ADVERT: u8 = 136;

/// NDP option: source link-layer address.
pub const NDP_OPT_SOURCE_LLADDR: u8 = 1;
/// NDP option: target link-layer address.
pub const NDP_OPT_TARGET_LLADDR: u8 = 2;
/// NDP option: prefix information.
pub const NDP_OPT_PREFIX_INFO: u8 = 3;

/// Neighbor advertisement flag bits (first byte after the checksum).
pub const NA_FLAG_SOLICITED: u8 = 0x40;
pub const NA_FLAG_OVERRIDE: u8 = 0x20;

/// Neighbor solicitation/advertisement length without options.
const ND_BODY_LEN: usize = 24;
/// Neighbor advertisement with one link-layer option.
pub const NEIGHBOR_ADVERT_LEN: usize = ND_BODY_LEN + 8;
/// Router advertisement with prefix and source link-layer options.
pub const ROUTER_ADVERT_LEN: usize = 16 + 32 + 8;

/// Target address of a neighbor solicitation.
pub fn parse_neighbor_solicit(msg: &[u8]) -> Option<Ipv6Address> {
    if msg.len() < ND_BODY_LEN || msg[0] != ICMP6_NEIGHBOR_SOLICIT || msg[1] != 0 {
        return None;
    }
    Some(Ipv6Address::from_bytes(&msg[8..24]))
}

/// Neighbor advertisement for `target`, answering a solicitation.
pub fn build_neighbor_advert(target: &Ipv6Address, mac: MacAddress, solicited: bool) -> [u8; NEIGHBOR_ADVERT_LEN] {
    let mut msg = [0u8; NEIGHBOR_ADVERT_LEN];
    msg[0] = ICMP6_NEIGHBOR_ADVERT;
    msg[4] = NA_FLAG_OVERRIDE | if solicited { NA_FLAG_SOLICITED } else { 0 };
    msg[8..24].copy_from_slice(target.as_bytes());
    msg[24] = NDP_OPT_TARGET_LLADDR;
    msg[25] = 1; // length in units of 8 bytes
    msg[26..32].copy_from_slice(mac.as_bytes());
    msg
}

/// Echo reply mirroring `request` (identifier, sequence and data intact).
pub fn build_echo_reply(request: &[u8]) -> Option<Vec<u8>> {
    if request.len() < 8 || request[0] != ICMP6_ECHO_REQUEST {
        return None;
    }
    let mut reply = request.to_vec();
    reply[0] = ICMP6_ECHO_REPLY;
    reply[2] = 0;
    reply[3] = 0;
    Some(reply)
}

/// Router advertisement offering `prefix`/64 for autoconfiguration.
///
/// Router lifetime is zero: the node is not a default router, it only hands
/// out the on-link prefix. Prefix lifetimes are infinite.
pub fn build_router_advert(prefix: &Ipv6Address, mac: MacAddress) -> [u8; ROUTER_ADVERT_LEN] {
    let mut msg = [0u8; ROUTER_ADVERT_LEN];
    msg[0] = ICMP6_ROUTER_ADVERT;
    msg[4] = 0xFF; // cur hop limit
    // flags, router lifetime, reachable, retrans all zero

    let opt = &mut msg[16..48];
    opt[0] = NDP_OPT_PREFIX_INFO;
    opt[1] = 4;
    opt[2] = 64; // prefix length
    opt[3] = 0xC0; // on-link | autonomous
    opt[4..8].copy_from_slice(&u32::MAX.to_be_bytes()); // valid lifetime
    opt[8..12].copy_from_slice(&u32::MAX.to_be_bytes()); // preferred lifetime
    opt[16..24].copy_from_slice(&prefix.as_bytes()[..8]);

    let opt = &mut msg[48..56];
    opt[0] = NDP_OPT_SOURCE_LLADDR;
    opt[1] = 1;
    opt[2..8].copy_from_slice(mac.as_bytes());
    msg
}
