//! File destinations for netboot and TFTP transfers.
//!
//! Both transfer protocols reach storage through the [`FileBackend`]
//! contract; [`FileRouter`] implements it by picking a destination from the
//! file name.

pub mod names;
pub mod netboot_buf;
pub mod board;
pub mod passthrough;
pub mod router;

use std::time::Duration;

use crate::error::Result;

pub use board::{SysInfo, StaticSysInfo, BOARD_INFO_LEN};
pub use names::{classify, FileRoute, NetbootFile};
pub use netboot_buf::{BootImages, NetbootFiles};
pub use passthrough::{MemoryFs, NoPassthrough, PassthroughFs};
pub use router::FileRouter;

/// Open/read/write/close contract shared by the transfer protocols.
pub trait FileBackend {
    /// Open `name` for reading; returns its size.
    fn open_read(&mut self, name: &str) -> Result<u64>;

    /// Open `name` for writing `size` bytes.
    ///
    /// `timeout` is the transfer's retransmit timeout; backends that finish
    /// work asynchronously scale their own deadlines from it.
    fn open_write(&mut self, name: &str, size: u64, timeout: Duration) -> Result<()>;

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    fn write(&mut self, data: &[u8], offset: u64) -> Result<()>;

    fn close(&mut self);

    /// Stop the open transfer and discard partial state.
    fn abort(&mut self);
}
