//! Debug log transport.
//!
//! Log lines are batched into packets multicast to the debug-log port. Each
//! packet carries a sequence number and is retransmitted until the listener
//! acknowledges it, so nothing is lost while a host is attached:
//!
//! ```text
//! device :33338 ──{magic, seqno, nodename[64], data}──▶ ff02::1 :33337
//! device :33338 ◀──────────{magic, seqno}──────────── listener
//! ```
//!
//! [`DebugLogWriter`] is the producer end and also implements
//! [`log::Log`], so it can be installed as (or chained into) the process
//! logger.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{Level, Log, Metadata, Record};
use smoltcp::time::{Duration, Instant};

use crate::inet6::{UdpSink, ALL_NODES};

pub const DEBUGLOG_MAGIC: u32 = 0xAEAE_1123;
pub const DEBUGLOG_PORT: u16 = 33337;
pub const DEBUGLOG_ACK_PORT: u16 = 33338;

pub const NODENAME_FIELD_LEN: usize = 64;
pub const DEBUGLOG_HDR_LEN: usize = 8 + NODENAME_FIELD_LEN;
/// Log bytes per packet.
pub const MAX_LOG_DATA: usize = 1216;

/// Retransmit interval right after a send.
pub const SEND_DELAY_SHORT: Duration = Duration::from_millis(100);
/// Retransmit interval once nobody seems to be listening.
pub const SEND_DELAY_LONG: Duration = Duration::from_millis(4000);
/// Short retries before backing off.
pub const MAX_SHORT_RETRIES: u32 = 5;

/// Lines buffered between the producers and the transport.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Appended to a line cut down to [`MAX_LOG_DATA`].
const TRUNCATED_MARKER: &str = "...[truncated]\n";

/// Fit `line` into one packet, cutting on a `char` boundary.
fn clip_line(mut line: String) -> String {
    if line.len() <= MAX_LOG_DATA {
        return line;
    }
    let mut end = MAX_LOG_DATA - TRUNCATED_MARKER.len();
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line.truncate(end);
    line.push_str(TRUNCATED_MARKER);
    line
}

/// Producer handle for log lines.
#[derive(Clone)]
pub struct DebugLogWriter {
    tx: Sender<String>,
    level: Level,
}

impl DebugLogWriter {
    /// Queue one line. Dropped when the queue is full; lines longer than a
    /// packet are cut and marked.
    pub fn write_line(&self, line: &str) {
        let _ = self.tx.try_send(clip_line(line.to_string()));
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Log for DebugLogWriter {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.write_line(&format!("[{}] {}: {}\n", record.level(), record.target(), record.args()));
        }
    }

    fn flush(&self) {}
}

pub struct DebugLog {
    rx: Receiver<String>,
    nodename: [u8; NODENAME_FIELD_LEN],
    seqno: u32,
    /// Encoded packet waiting for its ack.
    pending: Option<Vec<u8>>,
    /// Line that did not fit into the previous packet.
    carry: Option<String>,
    next_send: Instant,
    retries: u32,
}

impl DebugLog {
    /// Create the transport and its producer handle.
    pub fn new(nodename: &str, depth: usize) -> (Self, DebugLogWriter) {
        let (tx, rx) = bounded(depth);
        let mut field = [0u8; NODENAME_FIELD_LEN];
        // Keep one byte for the terminating NUL.
        let n = nodename.len().min(NODENAME_FIELD_LEN - 1);
        field[..n].copy_from_slice(&nodename.as_bytes()[..n]);
        let log = Self {
            rx,
            nodename: field,
            seqno: 0,
            pending: None,
            carry: None,
            next_send: Instant::ZERO,
            retries: 0,
        };
        (log, DebugLogWriter { tx, level: Level::Info })
    }

    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.carry.is_none() && self.rx.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        (!self.is_idle()).then_some(self.next_send)
    }

    /// Batch queued lines into the next packet.
    fn fill(&mut self) -> Option<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(line) = self.carry.take().or_else(|| self.rx.try_recv().ok()) {
            if data.len() + line.len() > MAX_LOG_DATA {
                self.carry = Some(line);
                break;
            }
            data.extend_from_slice(line.as_bytes());
        }
        if data.is_empty() {
            return None;
        }
        self.seqno = self.seqno.wrapping_add(1);
        let mut packet = Vec::with_capacity(DEBUGLOG_HDR_LEN + data.len());
        packet.extend_from_slice(&DEBUGLOG_MAGIC.to_le_bytes());
        packet.extend_from_slice(&self.seqno.to_le_bytes());
        packet.extend_from_slice(&self.nodename);
        packet.extend_from_slice(&data);
        Some(packet)
    }

    /// Send or retransmit when due.
    pub fn poll(&mut self, now: Instant, sink: &mut dyn UdpSink) {
        if self.pending.is_none() {
            self.pending = self.fill();
            self.retries = 0;
        }
        let Some(packet) = self.pending.as_ref() else {
            return;
        };
        if now < self.next_send {
            return;
        }
        // Failures are covered by the retransmit schedule.
        let _ = sink.send_udp(packet, &ALL_NODES, DEBUGLOG_PORT, DEBUGLOG_ACK_PORT, false);
        self.retries += 1;
        let delay = if self.retries < MAX_SHORT_RETRIES { SEND_DELAY_SHORT } else { SEND_DELAY_LONG };
        self.next_send = now + delay;
    }

    /// Handle an acknowledgement `{magic, seqno}`.
    pub fn recv_ack(&mut self, msg: &[u8], now: Instant) {
        if msg.len() < 8 || self.pending.is_none() {
            return;
        }
        let magic = u32::from_le_bytes([msg[0], msg[1], msg[2], msg[3]]);
        let seqno = u32::from_le_bytes([msg[4], msg[5], msg[6], msg[7]]);
        if magic == DEBUGLOG_MAGIC && seqno == self.seqno {
            self.pending = None;
            self.next_send = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::Ipv6Address;

    #[derive(Default)]
    struct Sent(Vec<Vec<u8>>);

    impl UdpSink for Sent {
        fn send_udp(&mut self, p: &[u8], d: &Ipv6Address, dport: u16, sport: u16, _b: bool) -> Result<()> {
            assert_eq!((*d, dport, sport), (ALL_NODES, DEBUGLOG_PORT, DEBUGLOG_ACK_PORT));
            self.0.push(p.to_vec());
            Ok(())
        }
    }

    fn ack(seqno: u32) -> Vec<u8> {
        let mut v = DEBUGLOG_MAGIC.to_le_bytes().to_vec();
        v.extend_from_slice(&seqno.to_le_bytes());
        v
    }

    fn at(ms: i64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_packet_layout_and_batching() {
        let (mut log, writer) = DebugLog::new("node-a", 16);
        writer.write_line("one\n");
        writer.write_line("two\n");
        let mut out = Sent::default();
        log.poll(at(0), &mut out);
        let pkt = &out.0[0];
        assert_eq!(&pkt[..4], &DEBUGLOG_MAGIC.to_le_bytes());
        assert_eq!(&pkt[4..8], &1u32.to_le_bytes());
        assert_eq!(&pkt[8..14], b"node-a");
        assert_eq!(pkt[14], 0);
        assert_eq!(&pkt[DEBUGLOG_HDR_LEN..], b"one\ntwo\n");
    }

    #[test]
    fn test_retransmit_until_acked() {
        let (mut log, writer) = DebugLog::new("n", 16);
        let mut out = Sent::default();
        writer.write_line("a");
        log.poll(at(0), &mut out);
        log.poll(at(50), &mut out);
        assert_eq!(out.0.len(), 1);
        log.poll(at(100), &mut out);
        assert_eq!(out.0.len(), 2);
        assert_eq!(out.0[0], out.0[1]);

        // Stale ack ignored.
        log.recv_ack(&ack(7), at(110));
        assert!(!log.is_idle());
        log.recv_ack(&ack(1), at(120));
        assert!(log.is_idle());

        writer.write_line("b");
        log.poll(at(120), &mut out);
        assert_eq!(&out.0[2][4..8], &2u32.to_le_bytes());
    }

    #[test]
    fn test_backoff_after_short_retries() {
        let (mut log, writer) = DebugLog::new("n", 16);
        let mut out = Sent::default();
        writer.write_line("a");
        let mut now = 0;
        for _ in 0..MAX_SHORT_RETRIES {
            log.poll(at(now), &mut out);
            now += 100;
        }
        assert_eq!(log.next_deadline(), Some(at(now - 100 + 4000)));
    }

    #[test]
    fn test_oversized_batch_carries_over() {
        let (mut log, writer) = DebugLog::new("n", 16);
        let mut out = Sent::default();
        let big = "x".repeat(1000);
        writer.write_line(&big);
        writer.write_line(&big);
        log.poll(at(0), &mut out);
        assert_eq!(out.0[0].len(), DEBUGLOG_HDR_LEN + 1000);
        log.recv_ack(&ack(1), at(1));
        log.poll(at(1), &mut out);
        assert_eq!(out.0[1].len(), DEBUGLOG_HDR_LEN + 1000);
    }

    #[test]
    fn test_long_line_cut_on_char_boundary() {
        let (mut log, writer) = DebugLog::new("n", 16);
        let mut out = Sent::default();
        // Two-byte chars; the cut point lands inside one.
        writer.write_line(&"é".repeat(MAX_LOG_DATA));
        log.poll(at(0), &mut out);
        let data = &out.0[0][DEBUGLOG_HDR_LEN..];
        assert!(data.len() <= MAX_LOG_DATA);
        let text = core::str::from_utf8(data).unwrap();
        assert!(text.starts_with('é'));
        assert!(text.ends_with(TRUNCATED_MARKER));
        assert!(!text.contains('\u{FFFD}'));
        log.recv_ack(&ack(1), at(1));
        assert!(log.is_idle());
    }

    #[test]
    fn test_log_facade_respects_level() {
        let (log, writer) = DebugLog::new("n", 16);
        let writer = writer.with_level(Level::Warn);
        writer.log(&Record::builder().level(Level::Info).args(format_args!("quiet")).build());
        assert!(log.is_idle());
        writer.log(&Record::builder().level(Level::Error).target("paver").args(format_args!("loud")).build());
        assert!(!log.is_idle());
    }
}
