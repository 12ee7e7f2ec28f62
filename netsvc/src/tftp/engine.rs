//! Server-side TFTP session engine.
//!
//! Pure protocol logic: the engine never touches the network or a clock.
//! Inbound messages and timer expiries are fed in by the owner, files are
//! reached through a [`FileBackend`], and packets leave through a
//! [`TransportSink`].
//!
//! # States
//!
//! ```text
//! Idle ─WRQ─▶ Receiving ─short DATA─▶ Done
//!   │
//!   └─RRQ─▶ (OptionAck) ─ACK 0─▶ Sending ─ACK last─▶ Done
//! ```

use std::time::Duration;

use log::{debug, trace};
use thiserror::Error;

use super::wire::{self, Options, Packet};
use crate::error::NetsvcError;
use crate::file::FileBackend;

/// Consecutive timeouts before a session is declared dead.
pub const MAX_TIMEOUTS: u32 = 5;

/// Outcome of feeding the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    /// The file backend pushed back; the peer's retransmission will retry.
    ShouldWait,
    Completed,
}

/// Fatal session error; the message is what gets logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TftpError {
    pub code: u16,
    pub message: String,
}

/// Packet output and timer control for one session.
pub trait TransportSink {
    fn send(&mut self, packet: &[u8]) -> crate::error::Result<()>;

    /// Retransmit interval negotiated for the session.
    fn set_timeout(&mut self, timeout: Duration);
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub bytes: u64,
    pub blocks: u64,
    pub retransmits: u64,
    /// Duplicate or out-of-window DATA received.
    pub stray_blocks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Receiving,
    /// RRQ answered with OACK, waiting for ACK 0.
    OptionAck,
    Sending,
    Done,
}

pub struct TftpSession {
    state: State,
    filename: String,
    writing: bool,
    block_size: usize,
    window: u64,
    timeout: Duration,
    size: u64,
    /// Receive: next block expected (never wraps).
    next_block: u64,
    /// Receive: blocks accepted since the last ACK.
    unacked: u64,
    /// Send: oldest unacknowledged block.
    base: u64,
    /// Send: number of the final (short) block.
    last_block: u64,
    /// Send: highest block transmitted at least once.
    highest_sent: u64,
    timeouts: u32,
    /// The backend accepted this session's open; only then is there a route
    /// to close or abort.
    opened: bool,
    /// Last control packet (ACK/OACK) for retransmission.
    control: Vec<u8>,
    scratch: Vec<u8>,
    block: Vec<u8>,
    metrics: SessionMetrics,
}

impl Default for TftpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TftpSession {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            filename: String::new(),
            writing: false,
            block_size: wire::DEFAULT_BLOCK_SIZE as usize,
            window: 1,
            timeout: Duration::from_secs(wire::DEFAULT_TIMEOUT_SECS as u64),
            size: 0,
            next_block: 1,
            unacked: 0,
            base: 1,
            last_block: 1,
            highest_sent: 0,
            timeouts: 0,
            opened: false,
            control: Vec::new(),
            scratch: Vec::new(),
            block: Vec::new(),
            metrics: SessionMetrics::default(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
    }

    pub fn is_write(&self) -> bool {
        self.writing
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// No request has been accepted yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Whether the file backend holds a route opened by this session.
    pub fn opened(&self) -> bool {
        self.opened
    }

    /// Feed one inbound message.
    pub fn handle(
        &mut self,
        msg: &[u8],
        file: &mut dyn FileBackend,
        transport: &mut dyn TransportSink,
    ) -> Result<Progress, TftpError> {
        let Some(packet) = wire::parse(msg) else {
            debug!("tftp: malformed packet ({} bytes)", msg.len());
            return Ok(Progress::Continue);
        };
        match (self.state, packet) {
            (_, Packet::Error { code, message }) => Err(TftpError {
                code,
                message: format!("{}: peer reported error {}: {}", self.filename, code, message),
            }),
            (State::Idle, Packet::Request { write, filename, options, .. }) => {
                self.start(write, filename, options, file, transport)
            }
            (State::Receiving, Packet::Data { block, data }) => self.on_data(block, data, file, transport),
            (State::OptionAck | State::Sending, Packet::Ack { block }) => self.on_ack(block, file, transport),
            (state, other) => {
                trace!("tftp: ignoring {:?} in {:?}", other, state);
                Ok(Progress::Continue)
            }
        }
    }

    /// The retransmit timer fired without progress.
    pub fn timeout(
        &mut self,
        file: &mut dyn FileBackend,
        transport: &mut dyn TransportSink,
    ) -> Result<Progress, TftpError> {
        if self.state == State::Done {
            return Ok(Progress::Continue);
        }
        self.timeouts += 1;
        if self.timeouts > MAX_TIMEOUTS {
            wire::write_error(&mut self.control, wire::ERR_CODE_UNDEFINED, "timed out");
            let _ = transport.send(&self.control);
            return Err(TftpError {
                code: wire::ERR_CODE_UNDEFINED,
                message: format!("{}: no response after {} retransmissions", self.filename, MAX_TIMEOUTS),
            });
        }
        self.metrics.retransmits += 1;
        match self.state {
            State::Receiving => {
                if self.next_block > 1 {
                    wire::write_ack(&mut self.control, (self.next_block - 1) as u16);
                    self.unacked = 0;
                }
                self.send_control(transport)
            }
            State::OptionAck => self.send_control(transport),
            // Nothing sent yet; only the give-up count matters.
            State::Idle => Ok(Progress::Continue),
            _ => self.send_window(file, transport),
        }
    }

    fn start(
        &mut self,
        write: bool,
        filename: &str,
        options: Options,
        file: &mut dyn FileBackend,
        transport: &mut dyn TransportSink,
    ) -> Result<Progress, TftpError> {
        self.filename = filename.to_string();
        self.writing = write;
        self.block_size = options
            .block_size
            .map(|b| b.clamp(wire::MIN_BLOCK_SIZE, wire::MAX_BLOCK_SIZE))
            .unwrap_or(wire::DEFAULT_BLOCK_SIZE) as usize;
        let timeout_secs = options
            .timeout
            .filter(|t| *t > 0)
            .unwrap_or(wire::DEFAULT_TIMEOUT_SECS);
        self.timeout = Duration::from_secs(timeout_secs as u64);
        let window = options
            .window_size
            .map(|w| w.clamp(1, wire::MAX_WINDOW_SIZE))
            .unwrap_or(1);
        self.window = window as u64;
        transport.set_timeout(self.timeout);

        let mut accepted = Options {
            block_size: options.block_size.map(|_| self.block_size as u16),
            timeout: options.timeout.map(|_| timeout_secs),
            transfer_size: None,
            window_size: options.window_size.map(|_| window),
        };

        if write {
            let size = options.transfer_size.unwrap_or(0);
            if let Err(e) = file.open_write(filename, size, self.timeout) {
                return self.fail(transport, e);
            }
            self.opened = true;
            self.size = size;
            accepted.transfer_size = options.transfer_size;
            self.state = State::Receiving;
            self.next_block = 1;
            if accepted.is_empty() {
                wire::write_ack(&mut self.control, 0);
            } else {
                wire::write_oack(&mut self.control, &accepted);
            }
            self.send_control(transport)
        } else {
            let size = match file.open_read(filename) {
                Ok(size) => size,
                Err(e) => return self.fail(transport, e),
            };
            self.opened = true;
            self.size = size;
            self.base = 1;
            self.last_block = size / self.block_size as u64 + 1;
            if options.transfer_size.is_some() {
                accepted.transfer_size = Some(size);
            }
            if accepted.is_empty() {
                self.state = State::Sending;
                self.send_window(file, transport)
            } else {
                self.state = State::OptionAck;
                wire::write_oack(&mut self.control, &accepted);
                self.send_control(transport)
            }
        }
    }

    fn on_data(
        &mut self,
        block: u16,
        data: &[u8],
        file: &mut dyn FileBackend,
        transport: &mut dyn TransportSink,
    ) -> Result<Progress, TftpError> {
        if block != self.next_block as u16 {
            // Duplicate or out of window: restate where we are.
            self.metrics.stray_blocks += 1;
            wire::write_ack(&mut self.control, (self.next_block - 1) as u16);
            self.unacked = 0;
            return self.send_control(transport);
        }
        if data.len() > self.block_size {
            return self.fail(transport, NetsvcError::InvalidArgs);
        }

        let offset = (self.next_block - 1) * self.block_size as u64;
        match file.write(data, offset) {
            Ok(()) => {}
            Err(NetsvcError::ShouldWait) => return Ok(Progress::ShouldWait),
            Err(e) => return self.fail(transport, e),
        }
        self.metrics.bytes += data.len() as u64;
        self.metrics.blocks += 1;
        self.timeouts = 0;
        self.next_block += 1;
        self.unacked += 1;

        if data.len() < self.block_size {
            wire::write_ack(&mut self.control, block);
            self.send_control(transport)?;
            self.state = State::Done;
            return Ok(Progress::Completed);
        }
        if self.unacked >= self.window {
            wire::write_ack(&mut self.control, block);
            self.unacked = 0;
            return self.send_control(transport);
        }
        Ok(Progress::Continue)
    }

    fn on_ack(
        &mut self,
        block: u16,
        file: &mut dyn FileBackend,
        transport: &mut dyn TransportSink,
    ) -> Result<Progress, TftpError> {
        if self.state == State::OptionAck {
            if block != 0 {
                return Ok(Progress::Continue);
            }
            self.state = State::Sending;
            self.timeouts = 0;
            return self.send_window(file, transport);
        }

        let sent_end = (self.base + self.window - 1).min(self.last_block);
        let Some(acked) = (self.base..=sent_end).rev().find(|k| *k as u16 == block) else {
            trace!("tftp: stale ack {}", block);
            return Ok(Progress::Continue);
        };
        self.base = acked + 1;
        self.timeouts = 0;
        if acked == self.last_block {
            self.state = State::Done;
            return Ok(Progress::Completed);
        }
        self.send_window(file, transport)
    }

    /// (Re)send every block of the current window.
    fn send_window(
        &mut self,
        file: &mut dyn FileBackend,
        transport: &mut dyn TransportSink,
    ) -> Result<Progress, TftpError> {
        let end = (self.base + self.window - 1).min(self.last_block);
        self.block.resize(self.block_size, 0);
        for number in self.base..=end {
            let offset = (number - 1) * self.block_size as u64;
            let n = match file.read(&mut self.block, offset) {
                Ok(n) => n,
                Err(NetsvcError::ShouldWait) => return Ok(Progress::ShouldWait),
                Err(e) => return self.fail(transport, e),
            };
            wire::write_data(&mut self.scratch, number as u16, &self.block[..n]);
            if number > self.highest_sent {
                self.highest_sent = number;
                self.metrics.bytes += n as u64;
                self.metrics.blocks += 1;
            }
            if let Err(e) = transport.send(&self.scratch) {
                debug!("tftp: send of block {} failed: {}", number, e);
            }
        }
        Ok(Progress::Continue)
    }

    fn send_control(&mut self, transport: &mut dyn TransportSink) -> Result<Progress, TftpError> {
        if let Err(e) = transport.send(&self.control) {
            // The peer retransmits; nothing else to do.
            debug!("tftp: send failed: {}", e);
        }
        Ok(Progress::Continue)
    }

    /// Report `err` to the peer and end the session.
    fn fail(&mut self, transport: &mut dyn TransportSink, err: NetsvcError) -> Result<Progress, TftpError> {
        let code = err.tftp_code();
        let reason = match err {
            NetsvcError::ShouldWait | NetsvcError::Busy => "busy".to_string(),
            ref other => other.to_string(),
        };
        wire::write_error(&mut self.control, code, &reason);
        let _ = transport.send(&self.control);
        self.state = State::Done;
        Err(TftpError {
            code,
            message: format!("{}: {}", self.filename, err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    /// In-memory file with a single open slot.
    #[derive(Default)]
    struct MemFile {
        data: Vec<u8>,
        declared: u64,
        opened: Option<String>,
        closed: bool,
        aborted: bool,
        open_err: Option<NetsvcError>,
        push_back: bool,
    }

    impl FileBackend for MemFile {
        fn open_read(&mut self, name: &str) -> Result<u64> {
            if let Some(e) = self.open_err.clone() {
                return Err(e);
            }
            self.opened = Some(name.into());
            Ok(self.data.len() as u64)
        }

        fn open_write(&mut self, name: &str, size: u64, _timeout: Duration) -> Result<()> {
            if let Some(e) = self.open_err.clone() {
                return Err(e);
            }
            self.opened = Some(name.into());
            self.declared = size;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
            let offset = (offset as usize).min(self.data.len());
            let n = buf.len().min(self.data.len() - offset);
            buf[..n].copy_from_slice(&self.data[offset..offset + n]);
            Ok(n)
        }

        fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
            if self.push_back {
                return Err(NetsvcError::ShouldWait);
            }
            let end = offset as usize + data.len();
            if end as u64 > self.declared {
                return Err(NetsvcError::OutOfRange);
            }
            if self.data.len() < end {
                self.data.resize(end, 0);
            }
            self.data[offset as usize..end].copy_from_slice(data);
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
        }

        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    #[derive(Default)]
    struct Wire {
        sent: Vec<Vec<u8>>,
        timeout: Option<Duration>,
    }

    impl TransportSink for Wire {
        fn send(&mut self, packet: &[u8]) -> Result<()> {
            self.sent.push(packet.to_vec());
            Ok(())
        }

        fn set_timeout(&mut self, timeout: Duration) {
            self.timeout = Some(timeout);
        }
    }

    fn wrq(name: &str, opts: &[(&str, &str)]) -> Vec<u8> {
        let mut msg = vec![0, 2];
        for part in [name, "octet"].iter().chain(opts.iter().flat_map(|(k, v)| [k, v])) {
            msg.extend_from_slice(part.as_bytes());
            msg.push(0);
        }
        msg
    }

    fn rrq(name: &str, opts: &[(&str, &str)]) -> Vec<u8> {
        let mut msg = wrq(name, opts);
        msg[1] = 1;
        msg
    }

    fn data(block: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        wire::write_data(&mut out, block, payload);
        out
    }

    fn ack(block: u16) -> Vec<u8> {
        let mut out = Vec::new();
        wire::write_ack(&mut out, block);
        out
    }

    #[test]
    fn test_write_transfer_plain() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        assert_eq!(s.handle(&wrq("f", &[]), &mut f, &mut w), Ok(Progress::Continue));
        assert_eq!(w.sent.pop().unwrap(), ack(0));
        assert_eq!(f.declared, 0);
    }

    #[test]
    fn test_write_transfer_with_options() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        let req = wrq("<<image>>zircona.img", &[("blksize", "8"), ("tsize", "20"), ("timeout", "3")]);
        s.handle(&req, &mut f, &mut w).unwrap();
        assert_eq!(w.timeout, Some(Duration::from_secs(3)));
        assert_eq!(
            wire::parse(&w.sent[0]),
            Some(Packet::Oack(Options {
                block_size: Some(8),
                timeout: Some(3),
                transfer_size: Some(20),
                window_size: None
            }))
        );
        assert_eq!(f.declared, 20);

        assert_eq!(s.handle(&data(1, b"AAAAAAAA"), &mut f, &mut w), Ok(Progress::Continue));
        assert_eq!(s.handle(&data(2, b"BBBBBBBB"), &mut f, &mut w), Ok(Progress::Continue));
        assert_eq!(s.handle(&data(3, b"CCCC"), &mut f, &mut w), Ok(Progress::Completed));
        assert_eq!(f.data, b"AAAAAAAABBBBBBBBCCCC");
        assert_eq!(w.sent.last().unwrap(), &ack(3));
        assert_eq!(s.metrics().bytes, 20);
        assert!(s.is_done());
    }

    #[test]
    fn test_duplicate_data_reacked_not_rewritten() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        s.handle(&wrq("f", &[("blksize", "8"), ("tsize", "16")]), &mut f, &mut w).unwrap();
        s.handle(&data(1, b"11111111"), &mut f, &mut w).unwrap();
        f.data[0] = b'X';
        s.handle(&data(1, b"11111111"), &mut f, &mut w).unwrap();
        assert_eq!(f.data[0], b'X');
        assert_eq!(w.sent.last().unwrap(), &ack(1));
        assert_eq!(s.metrics().stray_blocks, 1);
    }

    #[test]
    fn test_windowed_receive_acks_per_window() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        let req = wrq("f", &[("blksize", "8"), ("tsize", "40"), ("windowsize", "2")]);
        s.handle(&req, &mut f, &mut w).unwrap();
        w.sent.clear();
        s.handle(&data(1, &[1; 8]), &mut f, &mut w).unwrap();
        assert!(w.sent.is_empty());
        s.handle(&data(2, &[2; 8]), &mut f, &mut w).unwrap();
        assert_eq!(w.sent.pop().unwrap(), ack(2));

        // Block 4 arrives before 3: re-ACK the last in-order block.
        s.handle(&data(4, &[4; 8]), &mut f, &mut w).unwrap();
        assert_eq!(w.sent.pop().unwrap(), ack(2));
    }

    #[test]
    fn test_open_busy_reports_busy_code() {
        let mut f = MemFile { open_err: Some(NetsvcError::ShouldWait), ..Default::default() };
        let (mut s, mut w) = (TftpSession::new(), Wire::default());
        let err = s.handle(&wrq("<<image>>sparse.fvm", &[]), &mut f, &mut w).unwrap_err();
        assert_eq!(err.code, wire::ERR_CODE_BUSY);
        assert_eq!(
            wire::parse(&w.sent[0]),
            Some(Packet::Error { code: wire::ERR_CODE_BUSY, message: "busy" })
        );
    }

    #[test]
    fn test_refused_open_holds_no_route() {
        let mut f = MemFile { open_err: Some(NetsvcError::Busy), ..Default::default() };
        let (mut s, mut w) = (TftpSession::new(), Wire::default());
        assert!(s.handle(&wrq("f", &[]), &mut f, &mut w).is_err());
        assert!(!s.opened());

        let (mut s, mut f) = (TftpSession::new(), MemFile::default());
        s.handle(&wrq("f", &[]), &mut f, &mut w).unwrap();
        assert!(s.opened());
    }

    #[test]
    fn test_idle_session_gives_up_after_timeouts() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        s.handle(&ack(1), &mut f, &mut w).unwrap();
        assert!(s.is_idle());
        for _ in 0..MAX_TIMEOUTS {
            assert_eq!(s.timeout(&mut f, &mut w), Ok(Progress::Continue));
        }
        assert!(s.timeout(&mut f, &mut w).is_err());
        assert!(!s.opened());
    }

    #[test]
    fn test_write_error_fails_session() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        s.handle(&wrq("f", &[("blksize", "8"), ("tsize", "4")]), &mut f, &mut w).unwrap();
        let err = s.handle(&data(1, &[0; 8]), &mut f, &mut w).unwrap_err();
        assert_eq!(err.code, 3);
        assert!(matches!(wire::parse(w.sent.last().unwrap()), Some(Packet::Error { code: 3, .. })));
    }

    #[test]
    fn test_backpressure_does_not_advance() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        s.handle(&wrq("f", &[("blksize", "8"), ("tsize", "16")]), &mut f, &mut w).unwrap();
        f.push_back = true;
        assert_eq!(s.handle(&data(1, &[1; 8]), &mut f, &mut w), Ok(Progress::ShouldWait));
        f.push_back = false;
        assert_eq!(s.handle(&data(1, &[1; 8]), &mut f, &mut w), Ok(Progress::Continue));
        assert_eq!(w.sent.last().unwrap(), &ack(1));
    }

    #[test]
    fn test_timeouts_retransmit_then_give_up() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        s.handle(&wrq("f", &[]), &mut f, &mut w).unwrap();
        for _ in 0..MAX_TIMEOUTS {
            assert_eq!(s.timeout(&mut f, &mut w), Ok(Progress::Continue));
            assert_eq!(w.sent.last().unwrap(), &ack(0));
        }
        assert!(s.timeout(&mut f, &mut w).is_err());
        assert!(matches!(wire::parse(w.sent.last().unwrap()), Some(Packet::Error { .. })));
    }

    #[test]
    fn test_read_transfer() {
        let mut f = MemFile { data: (0..20u8).collect(), ..Default::default() };
        let (mut s, mut w) = (TftpSession::new(), Wire::default());
        s.handle(&rrq("<<image>>board_info", &[("blksize", "8"), ("tsize", "0")]), &mut f, &mut w)
            .unwrap();
        assert_eq!(
            wire::parse(&w.sent[0]),
            Some(Packet::Oack(Options {
                block_size: Some(8),
                transfer_size: Some(20),
                ..Default::default()
            }))
        );
        s.handle(&ack(0), &mut f, &mut w).unwrap();
        assert_eq!(w.sent.last().unwrap(), &data(1, &(0..8).collect::<Vec<u8>>()));
        s.handle(&ack(1), &mut f, &mut w).unwrap();
        s.handle(&ack(2), &mut f, &mut w).unwrap();
        assert_eq!(w.sent.last().unwrap(), &data(3, &(16..20).collect::<Vec<u8>>()));
        assert_eq!(s.handle(&ack(3), &mut f, &mut w), Ok(Progress::Completed));
        assert_eq!(s.metrics().bytes, 20);
    }

    #[test]
    fn test_read_exact_multiple_ends_with_empty_block() {
        let mut f = MemFile { data: vec![7; 8], ..Default::default() };
        let (mut s, mut w) = (TftpSession::new(), Wire::default());
        s.handle(&rrq("f", &[("blksize", "8")]), &mut f, &mut w).unwrap();
        s.handle(&ack(0), &mut f, &mut w).unwrap();
        s.handle(&ack(1), &mut f, &mut w).unwrap();
        assert_eq!(w.sent.last().unwrap(), &data(2, &[]));
        assert_eq!(s.handle(&ack(2), &mut f, &mut w), Ok(Progress::Completed));
    }

    #[test]
    fn test_peer_error_ends_session() {
        let (mut s, mut f, mut w) = (TftpSession::new(), MemFile::default(), Wire::default());
        s.handle(&wrq("f", &[]), &mut f, &mut w).unwrap();
        let mut err = Vec::new();
        wire::write_error(&mut err, 0, "cancelled by user");
        let e = s.handle(&err, &mut f, &mut w).unwrap_err();
        assert!(e.message.contains("cancelled by user"));
    }
}
