//! Driver abstraction module.
//!
//! The hardware driver lives outside this crate. It exchanges arena buffers
//! with the service through the [`EthernetDriver`] FIFO-style interface;
//! [`EthInterface`] layers the arena ownership protocol on top of it.

pub mod traits;
pub mod eth;
pub mod loopback;

// Re-exports
pub use eth::EthInterface;
pub use loopback::{LoopbackDriver, LoopbackWire};
pub use traits::{EthernetDriver, FrameTx, RxError, TxError};
