//! MorpheusX network boot service.
//!
//! A diskless machine announces itself on the local link, receives images
//! over a small IPv6/UDP stack (netboot control protocol plus TFTP) and
//! streams them into a disk provisioning service.
//!
//! # Architecture
//!
//! ```text
//! driver ─▶ arena ─▶ inet6 ─▶ dispatch ─┬─▶ netboot ─┐
//!                                       └─▶ tftp ────┴─▶ file router ─┬─▶ netboot buffers
//!                                                                     ├─▶ passthrough fs
//!                                                                     └─▶ paver ─▶ worker thread
//! ```

pub mod error;
pub mod types;
pub mod arena;
pub mod driver;
pub mod inet6;
pub mod dispatch;
pub mod netboot;
pub mod tftp;
pub mod file;
pub mod paver;
pub mod debuglog;
pub mod config;
pub mod mainloop;

pub use config::{NetsvcConfig, ConfigError};
pub use error::{NetsvcError, Result};
pub use mainloop::{serve, NetworkContext, RunExit, Services};
pub use netboot::{BootAction, BootHost, Role};
