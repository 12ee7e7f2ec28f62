//! Second-tier bootloader sub-protocol.
//!
//! Older loaders push volatile boot images with SEND_FILE followed by a run
//! of DATA packets keyed by byte offset, finished by LAST_DATA. The
//! sub-protocol keeps its own last-request slot so its retransmissions never
//! disturb the file protocol's.

use log::{debug, info, warn};

use super::fsm::LastRequest;
use super::proto::*;
use crate::file::{NetbootFile, NetbootFiles};

/// Commands this layer owns.
pub fn handles(cmd: u32) -> bool {
    matches!(cmd, NB_COMMAND | NB_SEND_FILE | NB_DATA | NB_LAST_DATA)
}

#[derive(Debug)]
struct Receive {
    file: NetbootFile,
    size: u64,
    offset: u64,
}

#[derive(Debug, Default)]
pub struct Bootloader {
    last: Option<LastRequest>,
    active: Option<Receive>,
}

impl Bootloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a SEND_FILE upload is underway.
    pub fn is_receiving(&self) -> bool {
        self.active.is_some()
    }

    /// Process one request; returns the reply to send.
    pub fn handle(&mut self, msg: &NetbootMessage<'_>, files: &mut NetbootFiles) -> Vec<u8> {
        if let Some(last) = self.last.as_ref().filter(|l| l.matches(msg)) {
            return last.reply.clone();
        }
        let (cmd, arg) = match msg.cmd {
            NB_COMMAND => {
                debug!("netboot: command '{}'", msg.data_str().unwrap_or(""));
                (NB_ACK, 0)
            }
            NB_SEND_FILE => self.send_file(msg, files),
            NB_DATA | NB_LAST_DATA => self.data(msg, files),
            _ => (NB_ERROR_BAD_CMD, 0),
        };
        let reply = encode(msg.cookie, cmd, arg, &[]);
        self.last = Some(LastRequest::new(msg, reply.clone()));
        reply
    }

    fn send_file(&mut self, msg: &NetbootMessage<'_>, files: &mut NetbootFiles) -> (u32, u32) {
        self.active = None;
        let Some(file) = msg.data_str().and_then(NetbootFile::from_name) else {
            warn!("netboot: send-file of unknown '{}'", msg.data_str().unwrap_or("?"));
            return (NB_ERROR_BAD_FILE, 0);
        };
        let size = msg.arg as u64;
        if size > NetbootFiles::max_size(file) || files.open_write(file, size).is_err() {
            warn!("netboot: {:?} of {} bytes does not fit", file, size);
            return (NB_ERROR_TOO_LARGE, 0);
        }
        info!("netboot: receiving {:?} ({} bytes)", file, size);
        self.active = Some(Receive { file, size, offset: 0 });
        (NB_ACK, 0)
    }

    fn data(&mut self, msg: &NetbootMessage<'_>, files: &mut NetbootFiles) -> (u32, u32) {
        let Some(rx) = self.active.as_mut() else {
            return (NB_ERROR_BAD_CMD, 0);
        };
        if msg.arg as u64 != rx.offset {
            // Tell the sender where to resume.
            return (NB_ACK, rx.offset as u32);
        }
        let end = rx.offset + msg.data.len() as u64;
        if end > rx.size {
            warn!("netboot: {:?} overflows its declared {} bytes", rx.file, rx.size);
            self.active = None;
            return (NB_ERROR_TOO_LARGE, 0);
        }
        if files.write(rx.file, msg.data, rx.offset).is_err() {
            self.active = None;
            return (NB_ERROR_BAD_PARAM, 0);
        }
        rx.offset = end;
        if msg.cmd == NB_LAST_DATA {
            info!("netboot: {:?} received ({} bytes)", rx.file, end);
            self.active = None;
            return (NB_FILE_RECEIVED, msg.arg);
        }
        (NB_ACK, msg.arg)
    }
}
