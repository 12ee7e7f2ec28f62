//! IPv6 engine: receive path, ICMPv6 responder, UDP transmit.
//!
//! The engine owns the interface addresses and the MAC cache. It never
//! holds a frame: inbound frames are borrowed for the duration of
//! [`Inet6::eth_recv`], outbound frames are built straight into arena
//! buffers obtained from a [`FrameTx`].
//!
//! # Accepted destinations
//! link-local, unique-local, solicited-node multicast, all-nodes. Anything
//! else is dropped before source learning.

use log::{debug, info, trace};
use smoltcp::time::Instant;

use super::addr::{self, ALL_NODES};
use super::cache::MacCache;
use super::checksum::upper_layer_checksum;
use super::header::{
    setup_packet, Ipv6Header, UdpHeader, HDR_ICMPV6, HDR_UDP, ICMP6_HLEN, UDP6_MAX_PAYLOAD,
    UDP_HLEN, UPPER_OFFSET,
};
use super::ndp;
use crate::driver::FrameTx;
use crate::error::{NetsvcError, Result};
use crate::types::{EthernetHeader, Ipv6Address, MacAddress, ETH_HLEN, ETH_MTU, ETH_P_IPV6};

/// A validated inbound UDP datagram, borrowing the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDatagram<'f> {
    pub src: Ipv6Address,
    pub dst: Ipv6Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'f [u8],
}

impl UdpDatagram<'_> {
    /// Whether the datagram was sent to a multicast group.
    pub fn is_multicast(&self) -> bool {
        self.dst.is_multicast()
    }
}

/// Packet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inet6Stats {
    pub rx_frames: u64,
    /// ICMPv6 messages that passed validation.
    pub rx_icmp: u64,
    pub rx_dropped: u64,
    pub tx_frames: u64,
    pub tx_dropped: u64,
}

/// Anything that can put a UDP datagram on the link.
pub trait UdpSink {
    /// Send `payload` from `sport` to `daddr`:`dport`.
    ///
    /// `block` selects whether buffer exhaustion waits for TX completions
    /// or skips the send.
    fn send_udp(&mut self, payload: &[u8], daddr: &Ipv6Address, dport: u16, sport: u16, block: bool) -> Result<()>;
}

/// The engine paired with a frame transmitter for one dispatch pass.
pub struct Outbound<'a, T: FrameTx> {
    pub inet: &'a mut Inet6,
    pub tx: &'a mut T,
}

impl<'a, T: FrameTx> Outbound<'a, T> {
    pub fn new(inet: &'a mut Inet6, tx: &'a mut T) -> Self {
        Self { inet, tx }
    }
}

impl<T: FrameTx> UdpSink for Outbound<'_, T> {
    fn send_udp(&mut self, payload: &[u8], daddr: &Ipv6Address, dport: u16, sport: u16, block: bool) -> Result<()> {
        self.inet.udp6_send(self.tx, payload, daddr, dport, sport, block)
    }
}

pub struct Inet6 {
    mac: MacAddress,
    ll: Ipv6Address,
    ula: Ipv6Address,
    snm: Ipv6Address,
    cache: MacCache,
    log_packets: bool,
    now: Instant,
    stats: Inet6Stats,
}

impl Inet6 {
    /// Derive the interface addresses from `mac`.
    pub fn new(mac: MacAddress, log_packets: bool) -> Self {
        let ll = addr::link_local(mac);
        let ula = addr::unique_local(mac);
        let snm = addr::solicited_node(mac);
        info!("inet6: mac {} ll {} ula {}", mac, ll, ula);
        Self {
            mac,
            ll,
            ula,
            snm,
            cache: MacCache::new(),
            log_packets,
            now: Instant::ZERO,
            stats: Inet6Stats::default(),
        }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn link_local(&self) -> Ipv6Address {
        self.ll
    }

    pub fn unique_local(&self) -> Ipv6Address {
        self.ula
    }

    pub fn solicited_node(&self) -> Ipv6Address {
        self.snm
    }

    pub fn stats(&self) -> Inet6Stats {
        self.stats
    }

    /// Advance the clock used for cache LRU stamps.
    pub fn set_now(&mut self, now: Instant) {
        self.now = now;
    }

    pub fn set_log_packets(&mut self, enabled: bool) {
        self.log_packets = enabled;
    }

    /// Seed a neighbor mapping without waiting for traffic from it.
    pub fn learn(&mut self, mac: MacAddress, ip: &Ipv6Address) {
        self.cache.learn(mac, ip, self.now);
    }

    /// Look up the link-layer address for `ip`.
    pub fn resolve(&mut self, ip: &Ipv6Address) -> Option<MacAddress> {
        self.cache.resolve(ip, self.now)
    }

    /// Whether `dst` is one of the four addresses this stack answers to.
    pub fn accepts(&self, dst: &Ipv6Address) -> bool {
        *dst == self.ll || *dst == self.ula || *dst == self.snm || *dst == ALL_NODES
    }

    /// Source address for packets to `dst`.
    fn source_for(&self, dst: &Ipv6Address) -> Ipv6Address {
        if addr::is_unique_local(dst) {
            self.ula
        } else {
            self.ll
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Receive path
    // ═══════════════════════════════════════════════════════════════════

    /// Process one inbound ethernet frame.
    ///
    /// ICMPv6 is answered in place through `tx`; a valid UDP datagram is
    /// returned for port dispatch. Everything else yields `None`.
    pub fn eth_recv<'f, T: FrameTx>(&mut self, tx: &mut T, frame: &'f [u8]) -> Option<UdpDatagram<'f>> {
        self.stats.rx_frames += 1;
        let icmp_before = self.stats.rx_icmp;
        let result = self.parse_and_handle(tx, frame);
        if result.is_none() && self.stats.rx_icmp == icmp_before {
            self.stats.rx_dropped += 1;
        }
        result
    }

    fn parse_and_handle<'f, T: FrameTx>(&mut self, tx: &mut T, frame: &'f [u8]) -> Option<UdpDatagram<'f>> {
        let eth = EthernetHeader::parse(frame)?;
        if eth.ethertype != ETH_P_IPV6 {
            return None;
        }
        let Some(ip) = Ipv6Header::parse(&frame[ETH_HLEN..]) else {
            trace!("inet6: bad ipv6 header");
            return None;
        };
        let available = frame.len() - UPPER_OFFSET;
        let length = ip.payload_len as usize;
        if length > available {
            debug!("inet6: payload length {} exceeds frame ({})", length, available);
            return None;
        }
        if !self.accepts(&ip.dst) {
            return None;
        }
        if self.log_packets {
            info!("inet6: rx {} -> {} nh {} len {}", ip.src, ip.dst, ip.next_header, length);
        }

        if ip.src.is_unicast() {
            self.cache.learn(eth.src, &ip.src, self.now);
        }

        let upper = &frame[UPPER_OFFSET..UPPER_OFFSET + length];
        match ip.next_header {
            HDR_ICMPV6 => {
                self.icmp6_recv(tx, &ip, upper);
                None
            }
            HDR_UDP => self.udp6_recv(&ip, upper),
            other => {
                trace!("inet6: dropping next header {}", other);
                None
            }
        }
    }

    fn udp6_recv<'f>(&mut self, ip: &Ipv6Header, upper: &'f [u8]) -> Option<UdpDatagram<'f>> {
        let udp = UdpHeader::parse(upper)?;
        let length = udp.length as usize;
        if length < UDP_HLEN || length > upper.len() {
            debug!("inet6: bad udp length {}", length);
            return None;
        }
        // Mandatory in IPv6.
        if udp.checksum == 0 {
            debug!("inet6: udp datagram without checksum from {}", ip.src);
            return None;
        }
        if upper_layer_checksum(&ip.src, &ip.dst, HDR_UDP, &upper[..length]) != 0 {
            debug!("inet6: udp checksum mismatch from {}", ip.src);
            return None;
        }
        Some(UdpDatagram {
            src: ip.src,
            dst: ip.dst,
            src_port: udp.src_port,
            dst_port: udp.dst_port,
            payload: &upper[UDP_HLEN..length],
        })
    }

    fn icmp6_recv<T: FrameTx>(&mut self, tx: &mut T, ip: &Ipv6Header, msg: &[u8]) {
        if msg.len() < ICMP6_HLEN {
            return;
        }
        if upper_layer_checksum(&ip.src, &ip.dst, HDR_ICMPV6, msg) != 0 {
            debug!("inet6: icmp6 checksum mismatch from {}", ip.src);
            return;
        }
        self.stats.rx_icmp += 1;

        match msg[0] {
            ndp::ICMP6_NEIGHBOR_SOLICIT => {
                let Some(target) = ndp::parse_neighbor_solicit(msg) else {
                    return;
                };
                if target != self.ll && target != self.ula {
                    return;
                }
                // Duplicate address detection probes come from ::, answer to all-nodes.
                let (dst, solicited) = if ip.src.is_unspecified() {
                    (ALL_NODES, false)
                } else {
                    (ip.src, true)
                };
                let na = ndp::build_neighbor_advert(&target, self.mac, solicited);
                // Best effort: the solicitor retries.
                let _ = self.icmp6_send(tx, &na, &target, &dst, false);
            }
            ndp::ICMP6_ECHO_REQUEST => {
                let Some(reply) = ndp::build_echo_reply(msg) else {
                    return;
                };
                let src = if ip.dst.is_multicast() { self.ll } else { ip.dst };
                let _ = self.icmp6_send(tx, &reply, &src, &ip.src, false);
            }
            other => trace!("inet6: ignoring icmp6 type {}", other),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Transmit path
    // ═══════════════════════════════════════════════════════════════════

    /// Send one UDP datagram.
    ///
    /// The source address is the ULA for `fd00::/8` destinations and the
    /// link-local address otherwise. An unresolvable unicast destination or
    /// an exhausted arena (with `block == false`) drops the packet.
    pub fn udp6_send<T: FrameTx>(
        &mut self,
        tx: &mut T,
        payload: &[u8],
        daddr: &Ipv6Address,
        dport: u16,
        sport: u16,
        block: bool,
    ) -> Result<()> {
        if payload.len() > UDP6_MAX_PAYLOAD {
            return Err(NetsvcError::OutOfRange);
        }
        let Some(dst_mac) = self.cache.resolve(daddr, self.now) else {
            debug!("inet6: no mac for {}, dropping udp to port {}", daddr, dport);
            self.stats.tx_dropped += 1;
            return Err(NetsvcError::Unreachable);
        };
        let Some(mut buf) = tx.get_buffer(block) else {
            debug!("inet6: no tx buffer, dropping udp to {}:{}", daddr, dport);
            self.stats.tx_dropped += 1;
            return Err(NetsvcError::ShouldWait);
        };

        let src = self.source_for(daddr);
        let upper_len = UDP_HLEN + payload.len();
        let frame = buf.as_mut_slice();
        let mut ck = setup_packet(frame, dst_mac, self.mac, &src, daddr, HDR_UDP, upper_len);

        let udp = &mut frame[UPPER_OFFSET..UPPER_OFFSET + upper_len];
        UdpHeader {
            src_port: sport,
            dst_port: dport,
            length: upper_len as u16,
            checksum: 0,
        }
        .write(udp);
        udp[UDP_HLEN..].copy_from_slice(payload);
        ck.add_bytes(udp);
        let sum = match ck.finish() {
            0 => 0xFFFF,
            sum => sum,
        };
        udp[6..8].copy_from_slice(&sum.to_be_bytes());

        buf.set_len(UPPER_OFFSET + upper_len);
        self.transmit(tx, buf, &src, daddr)
    }

    /// Send an ICMPv6 message whose checksum field is still zero.
    pub fn icmp6_send<T: FrameTx>(
        &mut self,
        tx: &mut T,
        msg: &[u8],
        src: &Ipv6Address,
        dst: &Ipv6Address,
        block: bool,
    ) -> Result<()> {
        if UPPER_OFFSET + msg.len() > ETH_HLEN + ETH_MTU {
            return Err(NetsvcError::OutOfRange);
        }
        let Some(dst_mac) = self.cache.resolve(dst, self.now) else {
            debug!("inet6: no mac for {}, dropping icmp6", dst);
            self.stats.tx_dropped += 1;
            return Err(NetsvcError::Unreachable);
        };
        let Some(mut buf) = tx.get_buffer(block) else {
            self.stats.tx_dropped += 1;
            return Err(NetsvcError::ShouldWait);
        };

        let frame = buf.as_mut_slice();
        let mut ck = setup_packet(frame, dst_mac, self.mac, src, dst, HDR_ICMPV6, msg.len());
        let icmp = &mut frame[UPPER_OFFSET..UPPER_OFFSET + msg.len()];
        icmp.copy_from_slice(msg);
        icmp[2] = 0;
        icmp[3] = 0;
        ck.add_bytes(icmp);
        icmp[2..4].copy_from_slice(&ck.finish().to_be_bytes());

        buf.set_len(UPPER_OFFSET + msg.len());
        self.transmit(tx, buf, src, dst)
    }

    /// Advertise the ULA /64 so hosts on the link can autoconfigure.
    #[cfg(feature = "router-advertisement")]
    pub fn send_router_advertisement<T: FrameTx>(&mut self, tx: &mut T) -> Result<()> {
        let ra = ndp::build_router_advert(&self.ula, self.mac);
        let src = self.ll;
        self.icmp6_send(tx, &ra, &src, &ALL_NODES, false)
    }

    fn transmit<T: FrameTx>(
        &mut self,
        tx: &mut T,
        buf: crate::arena::EthBuffer,
        src: &Ipv6Address,
        dst: &Ipv6Address,
    ) -> Result<()> {
        let len = buf.len();
        match tx.send(buf) {
            Ok(()) => {
                self.stats.tx_frames += 1;
                if self.log_packets {
                    info!("inet6: tx {} -> {} len {}", src, dst, len - UPPER_OFFSET);
                }
                Ok(())
            }
            Err(e) => {
                debug!("inet6: driver rejected frame to {}: {:?}", dst, e);
                self.stats.tx_dropped += 1;
                Err(NetsvcError::Io)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{BufferArena, EthBuffer};
    use crate::driver::TxError;
    use proptest::prelude::*;
    use smoltcp::wire::{EthernetFrame, Icmpv6Packet, IpAddress, Ipv6Packet, UdpPacket};

    const OUR_MAC: MacAddress = MacAddress([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
    const PEER_MAC: MacAddress = MacAddress([0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);

    /// Frame sink backed by a private arena.
    struct CaptureTx {
        arena: BufferArena,
        sent: Vec<Vec<u8>>,
    }

    impl CaptureTx {
        fn new() -> Self {
            Self { arena: BufferArena::new(8), sent: Vec::new() }
        }
    }

    impl FrameTx for CaptureTx {
        fn get_buffer(&mut self, _block: bool) -> Option<EthBuffer> {
            self.arena.acquire()
        }

        fn send(&mut self, buf: EthBuffer) -> core::result::Result<(), TxError> {
            self.sent.push(buf.frame().to_vec());
            self.arena.release(buf);
            Ok(())
        }
    }

    fn peer() -> Inet6 {
        let mut peer = Inet6::new(PEER_MAC, false);
        peer.learn(OUR_MAC, &addr::link_local(OUR_MAC));
        peer.learn(OUR_MAC, &addr::unique_local(OUR_MAC));
        peer
    }

    fn verify_udp(frame: &[u8]) -> (Ipv6Address, Ipv6Address, Vec<u8>) {
        let eth = EthernetFrame::new_checked(frame).unwrap();
        let ip = Ipv6Packet::new_checked(eth.payload()).unwrap();
        let (src, dst) = (ip.src_addr(), ip.dst_addr());
        assert_eq!(ip.hop_limit(), 255);
        let udp = UdpPacket::new_checked(ip.payload()).unwrap();
        assert!(udp.verify_checksum(&IpAddress::Ipv6(src), &IpAddress::Ipv6(dst)));
        (src, dst, udp.payload().to_vec())
    }

    #[test]
    fn test_udp_send_validates_with_smoltcp() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let dst = addr::link_local(PEER_MAC);
        inet.learn(PEER_MAC, &dst);

        inet.udp6_send(&mut tx, b"hello", &dst, 1234, 33330, false).unwrap();
        let (src, to, payload) = verify_udp(&tx.sent[0]);
        assert_eq!(src, inet.link_local());
        assert_eq!(to, dst);
        assert_eq!(payload, b"hello");
        assert_eq!(&tx.sent[0][0..6], PEER_MAC.as_bytes());
    }

    #[test]
    fn test_ula_destination_uses_ula_source() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let dst = addr::unique_local(PEER_MAC);
        inet.learn(PEER_MAC, &dst);
        inet.udp6_send(&mut tx, b"x", &dst, 1, 2, false).unwrap();
        assert_eq!(verify_udp(&tx.sent[0]).0, inet.unique_local());
    }

    #[test]
    fn test_unresolved_unicast_is_dropped() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let dst = addr::link_local(PEER_MAC);
        assert_eq!(inet.udp6_send(&mut tx, b"x", &dst, 1, 2, false), Err(NetsvcError::Unreachable));
        assert!(tx.sent.is_empty());
        assert_eq!(inet.stats().tx_dropped, 1);
    }

    #[test]
    fn test_multicast_send_needs_no_learning() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        inet.udp6_send(&mut tx, b"adv", &ALL_NODES, 33331, 33330, false).unwrap();
        assert_eq!(&tx.sent[0][0..6], &[0x33, 0x33, 0, 0, 0, 1]);
    }

    #[test]
    fn test_zero_checksum_sent_as_ffff() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        inet.udp6_send(&mut tx, &[1, 2, 0, 0], &ALL_NODES, 9, 9, false).unwrap();
        let frame = tx.sent.pop().unwrap();
        let c = [frame[UPPER_OFFSET + 6], frame[UPPER_OFFSET + 7]];

        // Folding the previous checksum into the payload makes the sum come out zero.
        inet.udp6_send(&mut tx, &[1, 2, c[0], c[1]], &ALL_NODES, 9, 9, false).unwrap();
        let frame = tx.sent.pop().unwrap();
        assert_eq!(&frame[UPPER_OFFSET + 6..UPPER_OFFSET + 8], &[0xFF, 0xFF]);
        verify_udp(&frame);
    }

    #[test]
    fn test_recv_roundtrip_and_learning() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut peer = peer();
        let mut tx = CaptureTx::new();
        let ours = inet.link_local();
        peer.udp6_send(&mut tx, b"query", &ours, 33330, 5000, false).unwrap();
        let frame = tx.sent.pop().unwrap();

        let mut reply_tx = CaptureTx::new();
        let dgram = inet.eth_recv(&mut reply_tx, &frame).unwrap();
        assert_eq!(dgram.payload, b"query");
        assert_eq!(dgram.src_port, 5000);
        assert_eq!(dgram.dst_port, 33330);
        assert!(!dgram.is_multicast());
        assert_eq!(inet.resolve(&peer.link_local()), Some(PEER_MAC));
    }

    #[test]
    fn test_recv_drops_foreign_destination() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut peer = Inet6::new(PEER_MAC, false);
        let other = addr::link_local(MacAddress([2, 9, 9, 9, 9, 9]));
        peer.learn(OUR_MAC, &other);
        let mut tx = CaptureTx::new();
        peer.udp6_send(&mut tx, b"nope", &other, 33330, 1, false).unwrap();

        let frame = tx.sent.pop().unwrap();
        assert!(inet.eth_recv(&mut tx, &frame).is_none());
        assert_eq!(inet.resolve(&peer.link_local()), None, "no learning from dropped frames");
        assert_eq!(inet.stats().rx_dropped, 1);
    }

    #[test]
    fn test_recv_drops_corrupt_checksum_and_truncation() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut peer = peer();
        let mut tx = CaptureTx::new();
        let ours = inet.link_local();
        peer.udp6_send(&mut tx, b"payload", &ours, 33330, 1, false).unwrap();
        let good = tx.sent.pop().unwrap();

        let mut bad = good.clone();
        *bad.last_mut().unwrap() ^= 0xFF;
        assert!(inet.eth_recv(&mut tx, &bad).is_none());

        let mut zero = good.clone();
        zero[UPPER_OFFSET + 6] = 0;
        zero[UPPER_OFFSET + 7] = 0;
        assert!(inet.eth_recv(&mut tx, &zero).is_none());

        assert!(inet.eth_recv(&mut tx, &good[..good.len() - 1]).is_none());

        let mut v4 = good.clone();
        v4[ETH_HLEN] = 0x45;
        assert!(inet.eth_recv(&mut tx, &v4).is_none());

        let mut arp = good.clone();
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert!(inet.eth_recv(&mut tx, &arp).is_none());

        assert!(inet.eth_recv(&mut tx, &good).is_some());
    }

    fn icmp_frame(src_mac: MacAddress, src: Ipv6Address, dst: Ipv6Address, msg: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; UPPER_OFFSET + msg.len()];
        let mut ck = setup_packet(&mut frame, OUR_MAC, src_mac, &src, &dst, HDR_ICMPV6, msg.len());
        frame[UPPER_OFFSET..].copy_from_slice(msg);
        ck.add_bytes(msg);
        let sum = ck.finish();
        frame[UPPER_OFFSET + 2..UPPER_OFFSET + 4].copy_from_slice(&sum.to_be_bytes());
        frame
    }

    fn neighbor_solicit(target: &Ipv6Address) -> Vec<u8> {
        let mut msg = vec![0u8; 24];
        msg[0] = ndp::ICMP6_NEIGHBOR_SOLICIT;
        msg[8..24].copy_from_slice(target.as_bytes());
        msg
    }

    #[test]
    fn test_neighbor_solicit_answered_from_target() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let peer_ll = addr::link_local(PEER_MAC);
        let ula = inet.unique_local();
        let frame = icmp_frame(PEER_MAC, peer_ll, inet.solicited_node(), &neighbor_solicit(&ula));

        assert!(inet.eth_recv(&mut tx, &frame).is_none());
        assert_eq!(tx.sent.len(), 1);

        let eth = EthernetFrame::new_checked(&tx.sent[0][..]).unwrap();
        let ip = Ipv6Packet::new_checked(eth.payload()).unwrap();
        assert_eq!(ip.src_addr(), ula);
        assert_eq!(ip.dst_addr(), peer_ll);
        let icmp = Icmpv6Packet::new_checked(ip.payload()).unwrap();
        assert!(icmp.verify_checksum(&IpAddress::Ipv6(ula), &IpAddress::Ipv6(peer_ll)));
        let body = ip.payload();
        assert_eq!(body[0], ndp::ICMP6_NEIGHBOR_ADVERT);
        assert_eq!(body[4], ndp::NA_FLAG_SOLICITED | ndp::NA_FLAG_OVERRIDE);
        assert_eq!(&body[26..32], OUR_MAC.as_bytes());
    }

    #[test]
    fn test_neighbor_solicit_for_other_target_ignored() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let stranger = addr::link_local(MacAddress([2, 1, 1, 1, 1, 1]));
        let frame = icmp_frame(
            PEER_MAC,
            addr::link_local(PEER_MAC),
            ALL_NODES,
            &neighbor_solicit(&stranger),
        );
        inet.eth_recv(&mut tx, &frame);
        assert!(tx.sent.is_empty());
    }

    #[test]
    fn test_echo_request_reply() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let peer_ll = addr::link_local(PEER_MAC);
        let req = [ndp::ICMP6_ECHO_REQUEST, 0, 0, 0, 0x12, 0x34, 0, 1, 1, 2, 3];
        let frame = icmp_frame(PEER_MAC, peer_ll, ALL_NODES, &req);
        inet.eth_recv(&mut tx, &frame);

        let eth = EthernetFrame::new_checked(&tx.sent[0][..]).unwrap();
        let ip = Ipv6Packet::new_checked(eth.payload()).unwrap();
        assert_eq!(ip.src_addr(), inet.link_local(), "multicast echo answered from link-local");
        let icmp = Icmpv6Packet::new_checked(ip.payload()).unwrap();
        assert!(icmp.verify_checksum(&IpAddress::Ipv6(ip.src_addr()), &IpAddress::Ipv6(peer_ll)));
        assert_eq!(ip.payload()[0], ndp::ICMP6_ECHO_REPLY);
        assert_eq!(&ip.payload()[4..], &req[4..]);
    }

    #[test]
    fn test_bad_icmp_checksum_ignored() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        let req = [ndp::ICMP6_ECHO_REQUEST, 0, 0, 0, 0, 1, 0, 1];
        let mut frame = icmp_frame(PEER_MAC, addr::link_local(PEER_MAC), ALL_NODES, &req);
        frame[UPPER_OFFSET + 2] ^= 0x55;
        inet.eth_recv(&mut tx, &frame);
        assert!(tx.sent.is_empty());
    }

    #[cfg(feature = "router-advertisement")]
    #[test]
    fn test_router_advertisement() {
        let mut inet = Inet6::new(OUR_MAC, false);
        let mut tx = CaptureTx::new();
        inet.send_router_advertisement(&mut tx).unwrap();
        let eth = EthernetFrame::new_checked(&tx.sent[0][..]).unwrap();
        let ip = Ipv6Packet::new_checked(eth.payload()).unwrap();
        assert_eq!(ip.src_addr(), inet.link_local());
        assert_eq!(ip.dst_addr(), ALL_NODES);
        assert_eq!(ip.payload()[0], ndp::ICMP6_ROUTER_ADVERT);
    }

    proptest! {
        #[test]
        fn prop_built_packets_verify(payload in proptest::collection::vec(any::<u8>(), 0..UDP6_MAX_PAYLOAD)) {
            let mut inet = Inet6::new(OUR_MAC, false);
            let mut tx = CaptureTx::new();
            inet.udp6_send(&mut tx, &payload, &ALL_NODES, 33331, 33330, false).unwrap();
            let frame = &tx.sent[0];
            let upper = &frame[UPPER_OFFSET..];
            prop_assert_eq!(upper_layer_checksum(&inet.link_local(), &ALL_NODES, HDR_UDP, upper), 0);
            prop_assert_ne!(&upper[6..8], &[0u8, 0][..]);
        }
    }
}
