//! TFTP server: wire codec, session engine and the UDP adapter.

pub mod adapter;
pub mod engine;
pub mod wire;

pub use adapter::{TftpAdapter, TFTP_INCOMING_PORT, TFTP_OUTGOING_PORT};
pub use engine::{Progress, SessionMetrics, TftpError, TftpSession, TransportSink, MAX_TIMEOUTS};
