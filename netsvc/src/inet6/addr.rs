//! Address derivation from the interface MAC.
//!
//! All layouts are bit-exact; hosts on the link compute the same addresses
//! from the advertised MAC.
//!
//! # Reference
//! RFC 4291 §2.5.1, §2.7.1; RFC 4193; RFC 2464 §7

use crate::types::{Ipv6Address, MacAddress};

/// `ff02::1`
pub const ALL_NODES: Ipv6Address = Ipv6Address::LINK_LOCAL_ALL_NODES;

/// Link-local address: `fe80::` + modified EUI-64 of the MAC.
pub fn link_local(mac: MacAddress) -> Ipv6Address {
    let m = mac.0;
    Ipv6Address([
        0xFE, 0x80, 0, 0, 0, 0, 0, 0,
        m[0] ^ 0x02, m[1], m[2], 0xFF, 0xFE, m[3], m[4], m[5],
    ])
}

/// Unique-local address: `fd` + MAC[1..6], zeros, MAC[3..6] in the low 24 bits.
///
/// The low 24 bits match the link-local address, so one solicited-node
/// group covers both.
pub fn unique_local(mac: MacAddress) -> Ipv6Address {
    let m = mac.0;
    Ipv6Address([
        0xFD, m[1], m[2], m[3], m[4], m[5], 0, 0,
        0, 0, 0, 0, 0, m[3], m[4], m[5],
    ])
}

/// Solicited-node multicast group `ff02::1:ffxx:xxxx` for the MAC's low 24 bits.
pub fn solicited_node(mac: MacAddress) -> Ipv6Address {
    let m = mac.0;
    Ipv6Address([
        0xFF, 0x02, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0x01, 0xFF, m[3], m[4], m[5],
    ])
}

/// Ethernet group address for an IPv6 multicast address: `33:33` + low 32 bits.
pub fn multicast_mac(ip: &Ipv6Address) -> MacAddress {
    let a = ip.0;
    MacAddress([0x33, 0x33, a[12], a[13], a[14], a[15]])
}

/// Check for the `fd00::/8` unique-local range.
pub fn is_unique_local(ip: &Ipv6Address) -> bool {
    ip.0[0] == 0xFD
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAC: MacAddress = MacAddress([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

    #[test]
    fn test_link_local_literal() {
        assert_eq!(link_local(MAC).to_string(), "fe80::5054:ff:fe12:3456");
    }

    #[test]
    fn test_unique_local_literal() {
        let ula = unique_local(MAC);
        assert_eq!(ula.0, [0xfd, 0x54, 0, 0x12, 0x34, 0x56, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_solicited_node_literal() {
        assert_eq!(solicited_node(MAC).to_string(), "ff02::1:ff12:3456");
        assert_eq!(solicited_node(MAC), link_local(MAC).solicited_node());
    }

    #[test]
    fn test_multicast_mac() {
        assert_eq!(multicast_mac(&ALL_NODES), MacAddress([0x33, 0x33, 0, 0, 0, 1]));
    }

    proptest! {
        #[test]
        fn prop_derivations_match_formulas(m in any::<[u8; 6]>()) {
            let mac = MacAddress(m);
            let ll = link_local(mac).0;
            prop_assert_eq!(&ll[..8], &[0xFE, 0x80, 0, 0, 0, 0, 0, 0][..]);
            prop_assert_eq!(ll[8], m[0] ^ 0x02);
            prop_assert_eq!(&ll[9..11], &m[1..3]);
            prop_assert_eq!(&ll[11..13], &[0xFF, 0xFE][..]);
            prop_assert_eq!(&ll[13..], &m[3..]);

            let ula = unique_local(mac).0;
            prop_assert_eq!(ula[0], 0xFD);
            prop_assert_eq!(&ula[1..6], &m[1..6]);
            prop_assert!(ula[6..13].iter().all(|b| *b == 0));
            prop_assert_eq!(&ula[13..], &m[3..]);

            let snm = solicited_node(mac);
            prop_assert_eq!(&snm.0[13..], &ula[13..]);
            prop_assert_eq!(snm, unique_local(mac).solicited_node());

            // Pure: same input, same output.
            prop_assert_eq!(link_local(mac), link_local(MacAddress(m)));
        }
    }
}
