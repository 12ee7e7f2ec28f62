//! TFTP packet layouts.
//!
//! # Reference
//! RFC 1350 (base protocol), RFC 2347 (option extension), RFC 2348
//! (blksize), RFC 2349 (timeout, tsize), RFC 7440 (windowsize)

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_WRQ: u16 = 2;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;
pub const OPCODE_OACK: u16 = 6;

pub const ERR_CODE_UNDEFINED: u16 = 0;
pub const ERR_CODE_FILE_NOT_FOUND: u16 = 1;
pub const ERR_CODE_ACCESS_VIOLATION: u16 = 2;
pub const ERR_CODE_DISK_FULL: u16 = 3;
pub const ERR_CODE_ILLEGAL_OP: u16 = 4;
pub const ERR_CODE_UNKNOWN_ID: u16 = 5;
pub const ERR_CODE_BAD_OPTIONS: u16 = 8;
/// Server is busy with a previous job; the client should retry.
pub const ERR_CODE_BUSY: u16 = 0x143;

pub const DEFAULT_BLOCK_SIZE: u16 = 512;
pub const MIN_BLOCK_SIZE: u16 = 8;
/// Largest block that fits one unfragmented frame (UDP payload minus header).
pub const MAX_BLOCK_SIZE: u16 = 1448;
pub const DEFAULT_TIMEOUT_SECS: u8 = 1;
pub const MAX_WINDOW_SIZE: u16 = 256;

/// Opcode + block number.
pub const DATA_HLEN: usize = 4;

/// Negotiable options. `None` means "not requested".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub block_size: Option<u16>,
    pub timeout: Option<u8>,
    pub transfer_size: Option<u64>,
    pub window_size: Option<u16>,
}

impl Options {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    Request { write: bool, filename: &'a str, mode: &'a str, options: Options },
    Data { block: u16, data: &'a [u8] },
    Ack { block: u16 },
    Error { code: u16, message: &'a str },
    Oack(Options),
}

fn be16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

/// NUL-terminated strings following the opcode.
fn strings(body: &[u8]) -> Option<Vec<&str>> {
    if body.last() != Some(&0) {
        return None;
    }
    body[..body.len() - 1]
        .split(|b| *b == 0)
        .map(|s| core::str::from_utf8(s).ok())
        .collect()
}

fn parse_options(pairs: &[&str]) -> Option<Options> {
    if pairs.len() % 2 != 0 {
        return None;
    }
    let mut opts = Options::default();
    for pair in pairs.chunks_exact(2) {
        let (name, value) = (pair[0], pair[1]);
        if name.eq_ignore_ascii_case("blksize") {
            opts.block_size = Some(value.parse().ok()?);
        } else if name.eq_ignore_ascii_case("timeout") {
            opts.timeout = Some(value.parse().ok()?);
        } else if name.eq_ignore_ascii_case("tsize") {
            opts.transfer_size = Some(value.parse().ok()?);
        } else if name.eq_ignore_ascii_case("windowsize") {
            opts.window_size = Some(value.parse().ok()?);
        }
        // Unknown options are not acknowledged.
    }
    Some(opts)
}

/// Decode one TFTP message. Malformed input yields `None`.
pub fn parse(msg: &[u8]) -> Option<Packet<'_>> {
    if msg.len() < 2 {
        return None;
    }
    let body = &msg[2..];
    match be16(msg) {
        op @ (OPCODE_RRQ | OPCODE_WRQ) => {
            let parts = strings(body)?;
            let (filename, mode) = (*parts.first()?, *parts.get(1)?);
            if filename.is_empty() {
                return None;
            }
            let options = parse_options(&parts[2..])?;
            Some(Packet::Request { write: op == OPCODE_WRQ, filename, mode, options })
        }
        OPCODE_DATA if body.len() >= 2 => Some(Packet::Data { block: be16(body), data: &body[2..] }),
        OPCODE_ACK if body.len() >= 2 => Some(Packet::Ack { block: be16(body) }),
        OPCODE_ERROR if body.len() >= 2 => {
            let text = &body[2..];
            let text = text.strip_suffix(&[0]).unwrap_or(text);
            let message = core::str::from_utf8(text).unwrap_or("");
            Some(Packet::Error { code: be16(body), message })
        }
        OPCODE_OACK => parse_options(&strings(body)?).map(Packet::Oack),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENCODERS
// ═══════════════════════════════════════════════════════════════════════════

pub fn write_data(out: &mut Vec<u8>, block: u16, data: &[u8]) {
    out.clear();
    out.extend_from_slice(&OPCODE_DATA.to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    out.extend_from_slice(data);
}

pub fn write_ack(out: &mut Vec<u8>, block: u16) {
    out.clear();
    out.extend_from_slice(&OPCODE_ACK.to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
}

pub fn write_error(out: &mut Vec<u8>, code: u16, message: &str) {
    out.clear();
    out.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(message.as_bytes());
    out.push(0);
}

pub fn write_oack(out: &mut Vec<u8>, opts: &Options) {
    fn opt(out: &mut Vec<u8>, name: &str, value: &dyn core::fmt::Display) {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(value.to_string().as_bytes());
        out.push(0);
    }
    out.clear();
    out.extend_from_slice(&OPCODE_OACK.to_be_bytes());
    if let Some(v) = opts.block_size {
        opt(out, "blksize", &v);
    }
    if let Some(v) = opts.timeout {
        opt(out, "timeout", &v);
    }
    if let Some(v) = opts.transfer_size {
        opt(out, "tsize", &v);
    }
    if let Some(v) = opts.window_size {
        opt(out, "windowsize", &v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrq_with_options() {
        let msg = b"\x00\x02<<image>>sparse.fvm\0octet\0BLKSIZE\01024\0tsize\0123456\0windowsize\08\0foo\0bar\0";
        let Some(Packet::Request { write, filename, mode, options }) = parse(msg) else {
            panic!("not a request");
        };
        assert!(write);
        assert_eq!(filename, "<<image>>sparse.fvm");
        assert_eq!(mode, "octet");
        assert_eq!(options.block_size, Some(1024));
        assert_eq!(options.transfer_size, Some(123456));
        assert_eq!(options.window_size, Some(8));
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse(b"\x00").is_none());
        assert!(parse(b"\x00\x01file\0octet").is_none(), "missing terminator");
        assert!(parse(b"\x00\x01\0octet\0").is_none(), "empty filename");
        assert!(parse(b"\x00\x01f\0octet\0blksize\0big\0").is_none());
        assert!(parse(b"\x00\x03\x00").is_none());
        assert!(parse(b"\x00\x09\x00\x01").is_none());
    }

    #[test]
    fn test_data_and_ack() {
        assert_eq!(parse(b"\x00\x03\x00\x07abc"), Some(Packet::Data { block: 7, data: b"abc" }));
        let mut out = Vec::new();
        write_ack(&mut out, 0x0102);
        assert_eq!(out, b"\x00\x04\x01\x02");
        assert_eq!(parse(&out), Some(Packet::Ack { block: 0x0102 }));
    }

    #[test]
    fn test_error_encoding() {
        let mut out = Vec::new();
        write_error(&mut out, ERR_CODE_BUSY, "busy");
        assert_eq!(out, b"\x00\x05\x01\x43busy\0");
        assert_eq!(parse(&out), Some(Packet::Error { code: ERR_CODE_BUSY, message: "busy" }));
    }

    #[test]
    fn test_oack_encoding() {
        let mut out = Vec::new();
        let opts = Options { block_size: Some(1024), transfer_size: Some(99), ..Default::default() };
        write_oack(&mut out, &opts);
        assert_eq!(out, b"\x00\x06blksize\x001024\x00tsize\x0099\x00");
        assert_eq!(parse(&out), Some(Packet::Oack(opts)));
    }
}
