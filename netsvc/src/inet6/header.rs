//! IPv6, UDP and ICMPv6 header layouts.
//!
//! Headers are decoded by copying fields out of the frame, never by
//! casting the frame in place, so alignment of the received buffer does not
//! matter.
//!
//! # Reference
//! RFC 8200 §3, RFC 768, RFC 4443 §2.1

use super::checksum::Checksum;
use crate::types::{EthernetHeader, Ipv6Address, MacAddress, ETH_HLEN, ETH_MTU, ETH_P_IPV6};

/// Fixed IPv6 header length.
pub const IPV6_HLEN: usize = 40;
/// UDP header length.
pub const UDP_HLEN: usize = 8;
/// ICMPv6 type/code/checksum.
pub const ICMP6_HLEN: usize = 4;

/// Next-header value for ICMPv6.
pub const HDR_ICMPV6: u8 = 58;
/// Next-header value for UDP.
pub const HDR_UDP: u8 = 17;

/// Hop limit on every packet this stack originates.
pub const HOP_LIMIT: u8 = 255;

/// Largest UDP payload that fits one frame.
pub const UDP6_MAX_PAYLOAD: usize = ETH_MTU - IPV6_HLEN - UDP_HLEN;

/// Offset of the upper-layer header in a frame.
pub const UPPER_OFFSET: usize = ETH_HLEN + IPV6_HLEN;

/// Decoded fixed IPv6 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Address,
    pub dst: Ipv6Address,
}

impl Ipv6Header {
    /// Decode from `bytes`, which must start at the IPv6 header.
    ///
    /// Returns `None` on a short buffer or a version other than 6.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; IPV6_HLEN] = bytes.get(..IPV6_HLEN)?.try_into().ok()?;
        if raw[0] >> 4 != 6 {
            return None;
        }
        Some(Self {
            payload_len: u16::from_be_bytes([raw[4], raw[5]]),
            next_header: raw[6],
            hop_limit: raw[7],
            src: Ipv6Address::from_bytes(&raw[8..24]),
            dst: Ipv6Address::from_bytes(&raw[24..40]),
        })
    }

    /// Encode with version 6, traffic class 0, flow label 0.
    pub fn write(&self, buf: &mut [u8]) -> usize {
        buf[0..4].copy_from_slice(&0x6000_0000u32.to_be_bytes());
        buf[4..6].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[6] = self.next_header;
        buf[7] = self.hop_limit;
        buf[8..24].copy_from_slice(self.src.as_bytes());
        buf[24..40].copy_from_slice(self.dst.as_bytes());
        IPV6_HLEN
    }
}

/// Decoded UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Header + payload length.
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..UDP_HLEN)?;
        Some(Self {
            src_port: u16::from_be_bytes([raw[0], raw[1]]),
            dst_port: u16::from_be_bytes([raw[2], raw[3]]),
            length: u16::from_be_bytes([raw[4], raw[5]]),
            checksum: u16::from_be_bytes([raw[6], raw[7]]),
        })
    }

    pub fn write(&self, buf: &mut [u8]) -> usize {
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        UDP_HLEN
    }
}

/// Write ethernet + IPv6 headers for an outbound packet.
///
/// Returns the running checksum seeded with the pseudo-header; the caller
/// adds the upper-layer header and payload, finishes it, and stores the
/// result at the protocol's checksum offset.
pub fn setup_packet(
    frame: &mut [u8],
    dst_mac: MacAddress,
    src_mac: MacAddress,
    src: &Ipv6Address,
    dst: &Ipv6Address,
    next_header: u8,
    upper_len: usize,
) -> Checksum {
    EthernetHeader {
        dst: dst_mac,
        src: src_mac,
        ethertype: ETH_P_IPV6,
    }
    .write(frame);
    Ipv6Header {
        payload_len: upper_len as u16,
        next_header,
        hop_limit: HOP_LIMIT,
        src: *src,
        dst: *dst,
    }
    .write(&mut frame[ETH_HLEN..]);
    Checksum::pseudo_header(src, dst, next_header, upper_len as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv6_header_layout() {
        let hdr = Ipv6Header {
            payload_len: 0x1234,
            next_header: HDR_UDP,
            hop_limit: HOP_LIMIT,
            src: Ipv6Address::LOOPBACK,
            dst: Ipv6Address::LINK_LOCAL_ALL_NODES,
        };
        let mut buf = [0u8; IPV6_HLEN];
        hdr.write(&mut buf);
        assert_eq!(&buf[..8], &[0x60, 0, 0, 0, 0x12, 0x34, 17, 255]);
        assert_eq!(Ipv6Header::parse(&buf), Some(hdr));
    }

    #[test]
    fn test_ipv6_rejects_wrong_version() {
        let mut buf = [0u8; IPV6_HLEN];
        buf[0] = 0x45;
        assert!(Ipv6Header::parse(&buf).is_none());
        assert!(Ipv6Header::parse(&buf[..39]).is_none());
    }

    #[test]
    fn test_udp_header_layout() {
        let hdr = UdpHeader { src_port: 33330, dst_port: 1234, length: 24, checksum: 0xBEEF };
        let mut buf = [0u8; UDP_HLEN];
        hdr.write(&mut buf);
        assert_eq!(buf, [0x82, 0x32, 0x04, 0xD2, 0, 24, 0xBE, 0xEF]);
        assert_eq!(UdpHeader::parse(&buf), Some(hdr));
    }
}
