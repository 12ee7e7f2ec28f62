//! Internet checksum (RFC 1071) with the IPv6 pseudo-header (RFC 8200 §8.1).
//!
//! Packets are checksummed incrementally: the header builder seeds a
//! [`Checksum`] with the pseudo-header and the caller folds in the
//! upper-layer header and payload as it writes them.

use crate::types::Ipv6Address;

/// Running one's-complement sum.
///
/// Slices may be added in pieces of any length; an odd trailing byte is
/// carried into the next call so the 16-bit word alignment is preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checksum {
    sum: u32,
    odd: Option<u8>,
}

impl Checksum {
    pub const fn new() -> Self {
        Self { sum: 0, odd: None }
    }

    /// Seed with the IPv6 pseudo-header.
    pub fn pseudo_header(src: &Ipv6Address, dst: &Ipv6Address, next_header: u8, length: u32) -> Self {
        let mut ck = Self::new();
        ck.add_bytes(src.as_bytes());
        ck.add_bytes(dst.as_bytes());
        ck.add_u32(length);
        ck.add_u32(next_header as u32);
        ck
    }

    pub fn add_bytes(&mut self, data: &[u8]) {
        let mut data = data;
        if let Some(hi) = self.odd.take() {
            match data.split_first() {
                Some((lo, rest)) => {
                    self.add_word(u16::from_be_bytes([hi, *lo]));
                    data = rest;
                }
                None => {
                    self.odd = Some(hi);
                    return;
                }
            }
        }

        let mut chunks = data.chunks_exact(2);
        for word in &mut chunks {
            self.add_word(u16::from_be_bytes([word[0], word[1]]));
        }
        if let [last] = chunks.remainder() {
            self.odd = Some(*last);
        }
    }

    pub fn add_u16(&mut self, value: u16) {
        self.add_bytes(&value.to_be_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.add_bytes(&value.to_be_bytes());
    }

    fn add_word(&mut self, word: u16) {
        self.sum = self.sum.wrapping_add(word as u32);
        // Fold early so the accumulator never overflows on jumbo payloads.
        if self.sum & 0x8000_0000 != 0 {
            self.sum = (self.sum & 0xFFFF) + (self.sum >> 16);
        }
    }

    /// Fold and complement.
    pub fn finish(mut self) -> u16 {
        if let Some(hi) = self.odd.take() {
            // Pad with zero.
            self.add_word(u16::from_be_bytes([hi, 0]));
        }
        let mut s = self.sum;
        while s >> 16 != 0 {
            s = (s & 0xFFFF) + (s >> 16);
        }
        !(s as u16)
    }
}

/// Calculate the Internet checksum of `data`.
pub fn calculate_checksum(data: &[u8]) -> u16 {
    let mut ck = Checksum::new();
    ck.add_bytes(data);
    ck.finish()
}

/// Checksum over pseudo-header + upper-layer bytes (checksum field included).
///
/// A valid packet yields zero.
pub fn upper_layer_checksum(src: &Ipv6Address, dst: &Ipv6Address, next_header: u8, data: &[u8]) -> u16 {
    let mut ck = Checksum::pseudo_header(src, dst, next_header, data.len() as u32);
    ck.add_bytes(data);
    ck.finish()
}
