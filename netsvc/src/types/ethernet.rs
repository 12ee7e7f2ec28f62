//! Ethernet frame types and helpers.
//!
//! # Reference
//! IEEE 802.3

pub use smoltcp::wire::EthernetAddress as MacAddress;

/// MAC address length.
pub const ETH_ALEN: usize = 6;

/// Ethernet header length (dst + src + ethertype).
pub const ETH_HLEN: usize = 14;

/// Ethernet MTU.
pub const ETH_MTU: usize = 1500;

/// Largest frame the service ever builds or accepts (header + MTU).
pub const ETH_FRAME_MAX: usize = ETH_HLEN + ETH_MTU;

/// Size of one arena buffer. Rounded up so a frame always fits.
pub const ETH_BUFFER_SIZE: usize = 2048;

/// EtherType for IPv6.
pub const ETH_P_IPV6: u16 = 0x86DD;

/// Ethernet header, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Parse the first 14 bytes of `frame`.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < ETH_HLEN {
            return None;
        }
        Some(Self {
            dst: MacAddress::from_bytes(&frame[0..6]),
            src: MacAddress::from_bytes(&frame[6..12]),
            ethertype: u16::from_be_bytes([frame[12], frame[13]]),
        })
    }

    /// Write the header into `buf`; returns bytes written.
    pub fn write(&self, buf: &mut [u8]) -> usize {
        buf[0..6].copy_from_slice(self.dst.as_bytes());
        buf[6..12].copy_from_slice(self.src.as_bytes());
        buf[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        ETH_HLEN
    }
}
