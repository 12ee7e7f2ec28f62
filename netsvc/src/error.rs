//! Network service error types.
//!
//! One status vocabulary is shared by the file router, the paver, the TFTP
//! engine and the netboot protocol. Each protocol layer translates it into
//! its own wire representation (`errno()` for netboot ACKs, `tftp_code()`
//! for TFTP ERROR packets).

use thiserror::Error;

pub type Result<T> = core::result::Result<T, NetsvcError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetsvcError {
    /// Resource is temporarily unavailable; the peer should retry later.
    #[error("resource busy, retry later")]
    ShouldWait,
    /// Another file route is already open.
    #[error("a transfer is already active")]
    Busy,
    #[error("invalid arguments")]
    InvalidArgs,
    #[error("file not found")]
    NotFound,
    #[error("operation not supported")]
    NotSupported,
    #[error("I/O error")]
    Io,
    #[error("offset out of range")]
    OutOfRange,
    #[error("out of memory")]
    NoMemory,
    /// Operation is not valid in the current state.
    #[error("bad state")]
    BadState,
    #[error("timed out")]
    TimedOut,
    #[error("operation cancelled")]
    Canceled,
    /// No link-layer address known for the destination.
    #[error("destination unreachable")]
    Unreachable,
    #[error("internal error: {0}")]
    Internal(String),
}

impl NetsvcError {
    /// POSIX errno carried (negated) in netboot ACK `arg` fields.
    pub fn errno(&self) -> i32 {
        match self {
            Self::ShouldWait => 11, // EAGAIN
            Self::Busy => 16,       // EBUSY
            Self::InvalidArgs => 22,
            Self::NotFound => 2,
            Self::NotSupported => 95, // EOPNOTSUPP
            Self::Io => 5,
            Self::OutOfRange => 34, // ERANGE
            Self::NoMemory => 12,
            Self::BadState => 9, // EBADF
            Self::TimedOut => 110,
            Self::Canceled => 125,
            Self::Unreachable => 113, // EHOSTUNREACH
            Self::Internal(_) => 5,
        }
    }

    /// Negated errno as the unsigned value that goes on the wire.
    pub fn wire_arg(&self) -> u32 {
        (-self.errno()) as u32
    }

    /// TFTP ERROR code (RFC 1350 §5) for this status.
    pub fn tftp_code(&self) -> u16 {
        match self {
            Self::NotFound => 1,
            Self::NoMemory | Self::OutOfRange => 3,
            Self::InvalidArgs | Self::NotSupported => 4,
            Self::Busy | Self::ShouldWait => crate::tftp::wire::ERR_CODE_BUSY,
            _ => 0,
        }
    }
}
