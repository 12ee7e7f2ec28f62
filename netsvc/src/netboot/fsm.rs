//! Netboot request state machine.
//!
//! State is implicit: the last fully processed request (for retransmission
//! dedup) plus the file opened through OPEN, if any.
//!
//! # Block rule (READ/WRITE)
//!
//! | `arg`              | action                               |
//! |--------------------|--------------------------------------|
//! | `0` or `last + 1`  | process, cache reply                 |
//! | `last`             | resend cached reply (WRITE: cookie must match, else `-EIO`) |
//! | anything else      | ignore, the sender retries           |

use std::time::Duration;

use log::{debug, error, info, trace, warn};

use super::advert::advert_message;
use super::bootloader::{self, Bootloader};
use super::proto::*;
use super::{BootAction, BootHost, Role};
use crate::error::NetsvcError;
use crate::file::{FileBackend, FileRouter};
use crate::inet6::{UdpDatagram, UdpSink};

/// Last processed request and the exact reply it produced.
#[derive(Debug, Clone)]
pub(crate) struct LastRequest {
    cookie: u32,
    cmd: u32,
    arg: u32,
    pub(crate) reply: Vec<u8>,
}

impl LastRequest {
    pub(crate) fn new(msg: &NetbootMessage<'_>, reply: Vec<u8>) -> Self {
        Self { cookie: msg.cookie, cmd: msg.cmd, arg: msg.arg, reply }
    }

    pub(crate) fn matches(&self, msg: &NetbootMessage<'_>) -> bool {
        (self.cookie, self.cmd, self.arg) == (msg.cookie, msg.cmd, msg.arg)
    }
}

/// File opened through OPEN.
#[derive(Debug)]
struct OpenFile {
    writing: bool,
    last_block: Option<u32>,
    last_cookie: u32,
    reply: Vec<u8>,
}

fn ack(cookie: u32, arg: u32) -> Vec<u8> {
    encode(cookie, NB_ACK, arg, &[])
}

pub struct NetbootServer {
    role: Role,
    nodename: String,
    /// Transfer timeout handed to the router on OPEN.
    timeout: Duration,
    last: Option<LastRequest>,
    file: Option<OpenFile>,
    bootloader: Bootloader,
}

impl NetbootServer {
    pub fn new(role: Role, nodename: &str, timeout: Duration) -> Self {
        Self {
            role,
            nodename: nodename.to_string(),
            timeout,
            last: None,
            file: None,
            bootloader: Bootloader::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn nodename(&self) -> &str {
        &self.nodename
    }

    /// A netboot-side transfer is underway.
    pub fn is_busy(&self) -> bool {
        self.file.is_some() || self.bootloader.is_receiving()
    }

    /// Handle one datagram from the control port.
    ///
    /// # Returns
    /// The boot action to run once the acknowledgement has left the host.
    pub fn recv(
        &mut self,
        dgram: &UdpDatagram<'_>,
        sink: &mut dyn UdpSink,
        router: &mut FileRouter,
        host: &mut dyn BootHost,
    ) -> Option<BootAction> {
        let Some(msg) = NetbootMessage::parse(dgram.payload) else {
            trace!("netboot: dropping malformed message from {}", dgram.src);
            return None;
        };

        if msg.cmd == NB_QUERY {
            if let Some(reply) = self.query(&msg) {
                send(sink, dgram, &reply);
            }
            return None;
        }
        if self.role == Role::Minimal {
            trace!("netboot: minimal role, ignoring cmd {}", msg.cmd);
            return None;
        }

        if bootloader::handles(msg.cmd) {
            let reply = self.bootloader.handle(&msg, router.netboot_files_mut());
            send(sink, dgram, &reply);
            return None;
        }

        if let Some(last) = self.last.as_ref().filter(|l| l.matches(&msg)) {
            trace!("netboot: retransmit of cookie {}, resending", msg.cookie);
            send(sink, dgram, &last.reply);
            return None;
        }

        let (reply, action) = match msg.cmd {
            NB_GET_ADVERT => (Some(advert_message(msg.cookie, &self.nodename)), None),
            NB_OPEN => (Some(self.open(&msg, router)), None),
            NB_READ => (self.read(&msg, router), None),
            NB_WRITE => (self.write(&msg, router), None),
            NB_CLOSE => {
                if self.file.take().is_some() {
                    router.close();
                }
                (Some(ack(msg.cookie, 0)), None)
            }
            NB_BOOT | NB_REBOOT => self.boot(&msg, router),
            NB_SHELL_CMD if dgram.is_multicast() => {
                debug!("netboot: ignoring multicast shell command");
                (None, None)
            }
            NB_SHELL_CMD => {
                let arg = match host.shell_command(msg.data_str().unwrap_or("")) {
                    Ok(()) => 0,
                    Err(e) => e.wire_arg(),
                };
                (Some(ack(msg.cookie, arg)), None)
            }
            other => {
                debug!("netboot: unknown command {:#x}", other);
                (Some(encode(msg.cookie, NB_ERROR_BAD_CMD, 0, &[])), None)
            }
        };

        // Ignored requests leave the dedup slot untouched.
        if let Some(reply) = reply {
            send(sink, dgram, &reply);
            self.last = Some(LastRequest::new(&msg, reply));
        }
        action
    }

    fn query(&self, msg: &NetbootMessage<'_>) -> Option<Vec<u8>> {
        let wanted = msg.data_str()?;
        if wanted != "*" && wanted != self.nodename {
            return None;
        }
        Some(encode(msg.cookie, NB_ACK, 0, &nul_terminated(&self.nodename)))
    }

    fn open(&mut self, msg: &NetbootMessage<'_>, router: &mut FileRouter) -> Vec<u8> {
        let Some(name) = msg.data_str().filter(|n| !n.is_empty()) else {
            return ack(msg.cookie, NetsvcError::InvalidArgs.wire_arg());
        };
        let result = match msg.arg {
            NB_OPEN_RDONLY => router.open_read(name).map(|_| false),
            NB_OPEN_WRONLY => {
                // Optional little-endian u64 size after the name's NUL.
                let size = msg.data[name.len()..]
                    .get(1..9)
                    .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                    .unwrap_or(0);
                router.open_write(name, size, self.timeout).map(|_| true)
            }
            _ => Err(NetsvcError::InvalidArgs),
        };
        match result {
            Ok(writing) => {
                debug!("netboot: opened '{}' for {}", name, if writing { "write" } else { "read" });
                self.file = Some(OpenFile { writing, last_block: None, last_cookie: msg.cookie, reply: Vec::new() });
                ack(msg.cookie, 0)
            }
            Err(e) => {
                warn!("netboot: open '{}' failed: {}", name, e);
                ack(msg.cookie, e.wire_arg())
            }
        }
    }

    fn read(&mut self, msg: &NetbootMessage<'_>, router: &mut FileRouter) -> Option<Vec<u8>> {
        let Some(file) = self.file.as_mut().filter(|f| !f.writing) else {
            return Some(ack(msg.cookie, NetsvcError::BadState.wire_arg()));
        };
        if file.last_block == Some(msg.arg) {
            let mut reply = file.reply.clone();
            reply[4..8].copy_from_slice(&msg.cookie.to_le_bytes());
            return Some(reply);
        }
        if msg.arg != 0 && file.last_block.map(|b| b.wrapping_add(1)) != Some(msg.arg) {
            trace!("netboot: read of block {} out of sequence", msg.arg);
            return None;
        }

        let mut block = [0u8; NB_BLOCK_SIZE];
        match router.read(&mut block, msg.arg as u64 * NB_BLOCK_SIZE as u64) {
            Ok(n) => {
                let reply = encode(msg.cookie, NB_ACK, n as u32, &block[..n]);
                file.last_block = Some(msg.arg);
                file.last_cookie = msg.cookie;
                file.reply = reply.clone();
                Some(reply)
            }
            Err(e) => {
                warn!("netboot: read failed: {}", e);
                self.file = None;
                router.abort();
                Some(ack(msg.cookie, e.wire_arg()))
            }
        }
    }

    fn write(&mut self, msg: &NetbootMessage<'_>, router: &mut FileRouter) -> Option<Vec<u8>> {
        let Some(file) = self.file.as_mut().filter(|f| f.writing) else {
            return Some(ack(msg.cookie, NetsvcError::BadState.wire_arg()));
        };
        if file.last_block == Some(msg.arg) {
            if file.last_cookie == msg.cookie {
                return Some(file.reply.clone());
            }
            return Some(ack(msg.cookie, NetsvcError::Io.wire_arg()));
        }
        if msg.arg != 0 && file.last_block.map(|b| b.wrapping_add(1)) != Some(msg.arg) {
            trace!("netboot: write of block {} out of sequence", msg.arg);
            return None;
        }

        match router.write(msg.data, msg.arg as u64 * NB_BLOCK_SIZE as u64) {
            Ok(()) => {
                let reply = ack(msg.cookie, 0);
                file.last_block = Some(msg.arg);
                file.last_cookie = msg.cookie;
                file.reply = reply.clone();
                Some(reply)
            }
            Err(e) => {
                warn!("netboot: write failed: {}", e);
                self.file = None;
                router.abort();
                Some(ack(msg.cookie, e.wire_arg()))
            }
        }
    }

    /// BOOT and REBOOT wait for the paver, then hand off.
    fn boot(&mut self, msg: &NetbootMessage<'_>, router: &mut FileRouter) -> (Option<Vec<u8>>, Option<BootAction>) {
        let what = if msg.cmd == NB_BOOT { "boot" } else { "reboot" };
        if router.paver().in_progress() {
            info!("netboot: {} waiting for paver to finish", what);
            while router.paver().in_progress() {
                std::thread::yield_now();
            }
        }
        let code = router.paver().exit_code();
        if !code.is_ok() {
            error!("netboot: paver failed ({:?}), refusing to {}", code, what);
            router.paver().reset_exit_code();
            return (Some(ack(msg.cookie, NetsvcError::Io.wire_arg())), None);
        }
        info!("netboot: {} requested", what);
        let action = if msg.cmd == NB_BOOT {
            BootAction::Boot(router.take_boot_images())
        } else {
            BootAction::Reboot
        };
        (Some(ack(msg.cookie, 0)), Some(action))
    }
}

fn send(sink: &mut dyn UdpSink, to: &UdpDatagram<'_>, reply: &[u8]) {
    if let Err(e) = sink.send_udp(reply, &to.src, to.src_port, NB_SERVER_PORT, false) {
        debug!("netboot: reply to {} not sent: {}", to.src, e);
    }
}
