//! Provisioning service interface.
//!
//! The service that actually writes partitions lives outside this crate.
//! A [`PaverConnector`] opens one session per job; the session is moved
//! onto the worker thread and dropped when the job ends.

use thiserror::Error;

use super::command::{Asset, Slot};

/// Provisioning service errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaverError {
    /// Could not reach the service at all.
    #[error("provisioning service unavailable")]
    Unavailable,
    /// The service rejected the operation.
    #[error("provisioning failed: {0}")]
    Failed(String),
    /// This service does not handle the requested target.
    #[error("unsupported target: {0}")]
    Unsupported(String),
    /// Payload stream ended because no data arrived in time.
    #[error("payload stream timed out")]
    StreamTimedOut,
    /// Payload stream ended because the transfer was aborted.
    #[error("payload stream canceled")]
    StreamCanceled,
}

/// Pull-style payload source handed to [`ProvisioningService::write_volumes`].
pub trait PayloadStream {
    /// Fill `buf` with the next bytes of the payload.
    ///
    /// Blocks until data is available. Returns `Ok(0)` at end of payload.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, PaverError>;
}

/// One connected provisioning session.
pub trait ProvisioningService: Send {
    fn write_asset(&mut self, slot: Slot, asset: Asset, payload: &[u8]) -> Result<(), PaverError>;

    /// `slot == None` targets the single-copy firmware of type `kind`.
    fn write_firmware(&mut self, slot: Option<Slot>, kind: &str, payload: &[u8]) -> Result<(), PaverError>;

    /// Write a file into the persistent data partition.
    fn write_data_file(&mut self, path: &str, payload: &[u8]) -> Result<(), PaverError>;

    /// Stream a volume image (FVM) into the volume manager partition.
    fn write_volumes(&mut self, stream: &mut dyn PayloadStream) -> Result<(), PaverError>;

    fn init_partition_tables(&mut self) -> Result<(), PaverError>;

    fn wipe_partition_tables(&mut self) -> Result<(), PaverError>;

    /// Make `slot` the next slot to boot.
    fn set_configuration_active(&mut self, slot: Slot) -> Result<(), PaverError>;

    /// Persist pending writes.
    fn flush(&mut self) -> Result<(), PaverError>;
}

/// Opens provisioning sessions.
pub trait PaverConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn ProvisioningService>, PaverError>;
}
