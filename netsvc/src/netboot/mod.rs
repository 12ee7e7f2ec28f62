//! Netboot control protocol.
//!
//! # Architecture
//!
//! ```text
//!   UDP :33330 ──▶ NetbootServer ──┬──▶ FileRouter   (OPEN/READ/WRITE/CLOSE)
//!                                  ├──▶ Bootloader   (SEND_FILE/DATA/...)
//!                                  └──▶ BootAction   (BOOT/REBOOT, run by the loop)
//!   Advertiser ──▶ UDP ff02::1:33331
//! ```
//!
//! Every reply is cached with the request's `(cookie, cmd, arg)`; a
//! retransmitted request gets the cached bytes back without side effects.

pub mod advert;
pub mod bootloader;
pub mod fsm;
pub mod proto;

use crate::error::Result;
use crate::file::BootImages;

pub use advert::{advert_message, advert_payload, Advertiser, ADVERT_INTERVAL};
pub use bootloader::Bootloader;
pub use fsm::NetbootServer;
pub use proto::{encode, NetbootMessage, NB_ADVERT_PORT, NB_MAGIC, NB_SERVER_PORT};

/// Which parts of the protocol this node answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Netboot loader: file transfer, advertisement, boot.
    #[default]
    Full,
    /// Name queries only.
    Minimal,
}

/// Terminal action requested by BOOT or REBOOT.
///
/// Returned to the event loop so the acknowledgement is on the wire before
/// control leaves the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootAction {
    Boot(BootImages),
    Reboot,
}

/// Host hooks the service cannot perform itself.
pub trait BootHost {
    /// Hand the received images to the kernel. Returns only on failure.
    fn mexec(&mut self, images: BootImages) -> Result<()>;

    fn reboot(&mut self) -> Result<()>;

    /// Run a SHELL_CMD request.
    fn shell_command(&mut self, command: &str) -> Result<()>;
}
