//! Binds the TFTP engine to the UDP transport and the file router.
//!
//! Sessions are established on [`TFTP_INCOMING_PORT`]; all replies, and every
//! later datagram of the session, use [`TFTP_OUTGOING_PORT`]. One session
//! exists at a time.

use log::{debug, error, info, warn};
use smoltcp::time::{Duration, Instant};

use super::engine::{Progress, TftpSession, TransportSink};
use super::wire::{self, Packet};
use crate::file::FileBackend;
use crate::inet6::{UdpDatagram, UdpSink};
use crate::types::Ipv6Address;

/// Port new sessions arrive on.
pub const TFTP_INCOMING_PORT: u16 = 33341;
/// Port the server talks from once a session exists.
pub const TFTP_OUTGOING_PORT: u16 = 33340;

struct ActiveSession {
    engine: TftpSession,
    peer: Ipv6Address,
    peer_port: u16,
    timeout: Duration,
    deadline: Instant,
    started: Instant,
}

/// Transport view handed to the engine for one call.
struct UdpTransport<'a, 's> {
    sink: &'a mut (dyn UdpSink + 's),
    peer: Ipv6Address,
    peer_port: u16,
    timeout: &'a mut Duration,
}

impl TransportSink for UdpTransport<'_, '_> {
    fn send(&mut self, packet: &[u8]) -> crate::error::Result<()> {
        self.sink
            .send_udp(packet, &self.peer, self.peer_port, TFTP_OUTGOING_PORT, true)
    }

    fn set_timeout(&mut self, timeout: std::time::Duration) {
        *self.timeout = Duration::from_millis(timeout.as_millis() as u64);
    }
}

#[derive(Default)]
pub struct TftpAdapter {
    session: Option<ActiveSession>,
}

impl TftpAdapter {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// When the event loop should call [`timeout_expired`](Self::timeout_expired).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session.as_ref().map(|s| s.deadline)
    }

    /// Feed one datagram addressed to either TFTP port.
    pub fn recv(
        &mut self,
        dgram: &UdpDatagram<'_>,
        now: Instant,
        sink: &mut dyn UdpSink,
        file: &mut dyn FileBackend,
    ) {
        if dgram.dst_port == TFTP_INCOMING_PORT {
            if !matches!(wire::parse(dgram.payload), Some(Packet::Request { .. })) {
                debug!("tftp: non-request packet on port {} from {}", TFTP_INCOMING_PORT, dgram.src);
                return;
            }
            if self.session.is_some() {
                warn!("tftp: only one simultaneous session allowed, dropping request from {}", dgram.src);
                return;
            }
            self.session = Some(ActiveSession {
                engine: TftpSession::new(),
                peer: dgram.src,
                peer_port: dgram.src_port,
                timeout: Duration::from_secs(1),
                deadline: now,
                started: now,
            });
        } else {
            match &self.session {
                Some(s) if s.peer == dgram.src && s.peer_port == dgram.src_port => {}
                _ => {
                    debug!("tftp: no session for {}:{}", dgram.src, dgram.src_port);
                    return;
                }
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let mut transport = UdpTransport {
            sink,
            peer: session.peer,
            peer_port: session.peer_port,
            timeout: &mut session.timeout,
        };
        let result = session.engine.handle(dgram.payload, file, &mut transport);
        session.deadline = now + session.timeout;
        self.settle(result, now, file);
    }

    /// Let the engine retransmit, or give up, after the deadline passed.
    pub fn timeout_expired(&mut self, now: Instant, sink: &mut dyn UdpSink, file: &mut dyn FileBackend) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if now < session.deadline {
            return;
        }
        let mut transport = UdpTransport {
            sink,
            peer: session.peer,
            peer_port: session.peer_port,
            timeout: &mut session.timeout,
        };
        let result = session.engine.timeout(file, &mut transport);
        session.deadline = now + session.timeout;
        self.settle(result, now, file);
    }

    fn settle(
        &mut self,
        result: Result<Progress, super::TftpError>,
        now: Instant,
        file: &mut dyn FileBackend,
    ) {
        match result {
            Ok(Progress::Continue) | Ok(Progress::ShouldWait) => {}
            Ok(Progress::Completed) => {
                if let Some(session) = self.session.take() {
                    let m = session.engine.metrics();
                    let elapsed = (now - session.started).total_millis().max(1);
                    info!(
                        "tftp: {} {} complete: {} bytes in {} blocks, {} retransmits, {} ms ({} KiB/s)",
                        if session.engine.is_write() { "write" } else { "read" },
                        session.engine.filename(),
                        m.bytes,
                        m.blocks,
                        m.retransmits,
                        elapsed,
                        m.bytes * 1000 / 1024 / elapsed,
                    );
                }
                file.close();
            }
            Err(e) => {
                error!("tftp: {}", e);
                // A refused open leaves whatever route is active to its owner.
                if self.session.take().is_some_and(|s| s.engine.opened()) {
                    file.abort();
                }
            }
        }
    }
}
