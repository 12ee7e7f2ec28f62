//! Netboot control protocol wire format.
//!
//! ```text
//! 0        4        8        12       16
//! +--------+--------+--------+--------+-------------
//! | magic  | cookie |  cmd   |  arg   | data ...
//! +--------+--------+--------+--------+-------------
//! ```
//!
//! All header fields are little-endian `u32`.

/// Header magic.
pub const NB_MAGIC: u32 = 0xAA77_4217;
pub const NB_HDR_LEN: usize = 16;

/// Protocol version announced in advertisements.
pub const NB_VERSION: u32 = 0x0001_0300;
pub const NB_VERSION_STRING: &str = "0.7.22";

/// Control port (requests in, replies out).
pub const NB_SERVER_PORT: u16 = 33330;
/// Port advertisements are multicast to.
pub const NB_ADVERT_PORT: u16 = 33331;

// Commands
pub const NB_COMMAND: u32 = 1;
pub const NB_SEND_FILE: u32 = 2;
pub const NB_DATA: u32 = 3;
pub const NB_BOOT: u32 = 4;
pub const NB_QUERY: u32 = 5;
pub const NB_SHELL_CMD: u32 = 6;
pub const NB_OPEN: u32 = 7;
pub const NB_READ: u32 = 8;
pub const NB_WRITE: u32 = 9;
pub const NB_CLOSE: u32 = 10;
pub const NB_LAST_DATA: u32 = 11;
pub const NB_REBOOT: u32 = 12;
pub const NB_GET_ADVERT: u32 = 13;

// Replies
pub const NB_ACK: u32 = 0;
pub const NB_FILE_RECEIVED: u32 = 0x7000_0001;
pub const NB_ADVERTISE: u32 = 0x7777_7777;
pub const NB_ERROR_BAD_CMD: u32 = 0x8000_0001;
pub const NB_ERROR_BAD_PARAM: u32 = 0x8000_0002;
pub const NB_ERROR_TOO_LARGE: u32 = 0x8000_0003;
pub const NB_ERROR_BAD_FILE: u32 = 0x8000_0004;

/// OPEN `arg` values.
pub const NB_OPEN_RDONLY: u32 = 0;
pub const NB_OPEN_WRONLY: u32 = 1;

/// READ/WRITE block size; block `n` lives at offset `n * NB_BLOCK_SIZE`.
pub const NB_BLOCK_SIZE: usize = 1024;

/// Decoded netboot message borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetbootMessage<'a> {
    pub cookie: u32,
    pub cmd: u32,
    pub arg: u32,
    pub data: &'a [u8],
}

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

impl<'a> NetbootMessage<'a> {
    /// Parse `msg`; short messages and bad magic yield `None`.
    pub fn parse(msg: &'a [u8]) -> Option<Self> {
        if msg.len() < NB_HDR_LEN || le32(msg) != NB_MAGIC {
            return None;
        }
        Some(Self {
            cookie: le32(&msg[4..]),
            cmd: le32(&msg[8..]),
            arg: le32(&msg[12..]),
            data: &msg[NB_HDR_LEN..],
        })
    }

    /// Payload up to the first NUL, as UTF-8.
    pub fn data_str(&self) -> Option<&'a str> {
        let end = self.data.iter().position(|b| *b == 0).unwrap_or(self.data.len());
        core::str::from_utf8(&self.data[..end]).ok()
    }
}

/// Serialize a message.
pub fn encode(cookie: u32, cmd: u32, arg: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NB_HDR_LEN + data.len());
    for word in [NB_MAGIC, cookie, cmd, arg] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// `data` with a trailing NUL, as string payloads travel.
pub fn nul_terminated(s: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(s.len() + 1);
    v.extend_from_slice(s.as_bytes());
    v.push(0);
    v
}
