//! Board identity files.
//!
//! `board_info` reads back a fixed 36-byte record; `board_name` lets the
//! host check that an image was built for this board before paving it.

use log::{error, warn};

use crate::error::{NetsvcError, Result};

/// Length of the NUL-padded name field.
pub const BOARD_NAME_LEN: usize = 32;
/// `name[32]` + little-endian `u32` revision.
pub const BOARD_INFO_LEN: usize = BOARD_NAME_LEN + 4;

/// System-information service.
pub trait SysInfo: Send {
    fn board_name(&self) -> Result<String>;
    fn board_revision(&self) -> Result<u32>;
}

/// Fixed board identity, for hosts that know it up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSysInfo {
    pub name: String,
    pub revision: u32,
}

impl SysInfo for StaticSysInfo {
    fn board_name(&self) -> Result<String> {
        Ok(self.name.clone())
    }

    fn board_revision(&self) -> Result<u32> {
        Ok(self.revision)
    }
}

/// Serialize the board record. Names longer than the field are truncated.
pub fn encode_board_info(name: &str, revision: u32) -> [u8; BOARD_INFO_LEN] {
    let mut record = [0u8; BOARD_INFO_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(BOARD_NAME_LEN);
    record[..n].copy_from_slice(&bytes[..n]);
    record[BOARD_NAME_LEN..].copy_from_slice(&revision.to_le_bytes());
    record
}

/// Board record from the system-information service.
pub fn read_board_info(sysinfo: &dyn SysInfo) -> Result<[u8; BOARD_INFO_LEN]> {
    let name = sysinfo.board_name()?;
    let revision = sysinfo.board_revision()?;
    Ok(encode_board_info(&name, revision))
}

/// Collects a `board_name` write and compares it once complete.
#[derive(Debug)]
pub struct BoardNameCheck {
    expected_len: usize,
    received: Vec<u8>,
}

impl BoardNameCheck {
    pub fn new(size: u64) -> Result<Self> {
        let expected_len = usize::try_from(size).map_err(|_| NetsvcError::InvalidArgs)?;
        // A name never needs more than a block.
        if expected_len > 4096 {
            return Err(NetsvcError::InvalidArgs);
        }
        Ok(Self { expected_len, received: Vec::with_capacity(expected_len) })
    }

    /// Accept the next bytes; the last write performs the comparison.
    ///
    /// Any failure to learn the real board name counts as a mismatch.
    pub fn write(&mut self, data: &[u8], offset: u64, sysinfo: &dyn SysInfo) -> Result<()> {
        let offset = offset as usize;
        let end = offset.checked_add(data.len()).ok_or(NetsvcError::OutOfRange)?;
        if end > self.expected_len {
            return Err(NetsvcError::OutOfRange);
        }
        if self.received.len() < end {
            self.received.resize(end, 0);
        }
        self.received[offset..end].copy_from_slice(data);
        if end < self.expected_len {
            return Ok(());
        }

        let supplied = String::from_utf8_lossy(&self.received);
        let supplied = supplied.trim_end_matches(['\0', '\n']);
        match sysinfo.board_name() {
            Ok(real) if real == supplied => Ok(()),
            Ok(real) => {
                error!("board: image built for '{}' but this is '{}'", supplied, real);
                Err(NetsvcError::InvalidArgs)
            }
            Err(e) => {
                warn!("board: cannot read board name: {}", e);
                Err(NetsvcError::InvalidArgs)
            }
        }
    }
}
