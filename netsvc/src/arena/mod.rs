//! Ethernet buffer arena.
//!
//! A fixed set of packet buffers allocated once at startup and shared with
//! the ethernet driver. Every buffer is tracked through an ownership state
//! machine so that a buffer is only ever reachable from one place: the free
//! list, a driver queue, or exactly one in-flight send/receive.

pub mod ownership;
pub mod buffer;
pub mod pool;

pub use buffer::{BufferHandle, EthBuffer};
pub use ownership::BufferOwner;
pub use pool::{BufferArena, ETH_BUFFER_COUNT};
