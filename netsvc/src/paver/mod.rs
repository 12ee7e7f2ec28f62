//! Streaming paver pipeline.
//!
//! Turns a file transfer into provisioning calls. The network side stages
//! bytes through a [`JobHandle`]; one detached worker thread per job feeds
//! them to the provisioning service.
//!
//! # State machine
//!
//! ```text
//! Idle ──open_write──▶ Receiving ──▶ Streaming  (FVM) ───┐
//!                          │                              ├──▶ Idle
//!                          └──────▶ Monitoring (others) ──┘
//! ```
//!
//! A job that ends badly leaves its [`ExitCode`] behind; it must be cleared
//! with [`Paver::reset_exit_code`] before the next job is accepted.

pub mod command;
pub mod staging;
pub mod service;
pub mod job;
mod worker;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::error::{NetsvcError, Result};

pub use command::{Asset, PaverCommand, Slot, Strategy};
pub use job::{CancelToken, ExitCode, JobHandle, PaverState, PaverStatus};
pub use service::{PaverConnector, PaverError, PayloadStream, ProvisioningService};
pub use staging::{StagingBuffer, PAGE_SIZE};

use job::{wake_channel, JobShared};
use worker::Worker;

/// Worker timeout as a multiple of the transfer's retransmit timeout.
pub const DEFAULT_TIMEOUT_MULTIPLIER: u32 = 5;

/// The single paver job slot.
pub struct Paver {
    connector: Arc<dyn PaverConnector>,
    status: Arc<PaverStatus>,
    job: Option<JobHandle>,
    timeout_multiplier: u32,
}

impl Paver {
    pub fn new(connector: Arc<dyn PaverConnector>) -> Self {
        Self {
            connector,
            status: Arc::new(PaverStatus::default()),
            job: None,
            timeout_multiplier: DEFAULT_TIMEOUT_MULTIPLIER,
        }
    }

    pub fn with_timeout_multiplier(mut self, multiplier: u32) -> Self {
        self.timeout_multiplier = multiplier.max(1);
        self
    }

    /// Whether a worker is still running.
    pub fn in_progress(&self) -> bool {
        self.status.in_progress()
    }

    pub fn state(&self) -> PaverState {
        self.status.state()
    }

    pub fn exit_code(&self) -> ExitCode {
        self.status.exit_code()
    }

    pub fn reset_exit_code(&self) {
        self.status.reset_exit_code();
    }

    /// Whether the network side still holds an open job.
    pub fn has_job(&self) -> bool {
        self.job.is_some()
    }

    /// Start a job for `command` expecting `size` bytes.
    ///
    /// # Arguments
    /// * `tftp_timeout` - the transfer's retransmit timeout; the worker
    ///   gives up after this times the configured multiplier without data.
    ///
    /// # Returns
    /// `ShouldWait` while a previous worker runs, `NoMemory` if staging
    /// cannot be allocated, `Io` if the service is unreachable.
    pub fn open_write(&mut self, command: PaverCommand, size: u64, tftp_timeout: Duration) -> Result<()> {
        if self.status.in_progress() {
            return Err(NetsvcError::ShouldWait);
        }
        let staging = match command.strategy() {
            Strategy::Streaming => StagingBuffer::paged(size),
            Strategy::Monitoring => StagingBuffer::contiguous(size),
        }
        .map_err(|e| {
            error!("paver: cannot stage {} bytes for {}", size, command);
            e
        })?;

        let service = self.connector.connect().map_err(|e| {
            error!("paver: cannot reach provisioning service: {}", e);
            NetsvcError::Io
        })?;

        let shared = Arc::new(JobShared::new(staging));
        let (wake_tx, wake_rx) = wake_channel();
        let timeout = tftp_timeout.saturating_mul(self.timeout_multiplier);
        let worker = Worker {
            command: command.clone(),
            shared: shared.clone(),
            wake: wake_rx,
            timeout,
            service,
            status: self.status.clone(),
        };

        self.status.begin();
        let spawned = std::thread::Builder::new()
            .name("paver-worker".into())
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            self.status.finish(ExitCode::Ok);
            return Err(NetsvcError::Internal(format!("spawn paver worker: {}", e)));
        }

        info!("paver: accepting {} bytes for {} (timeout {:?})", size, command, timeout);
        self.job = Some(JobHandle::new(shared, wake_tx));
        Ok(())
    }

    /// Stage `data` at `offset` of the open job.
    pub fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        let job = self.job.as_ref().ok_or(NetsvcError::BadState)?;
        if let Some(err) = self.status.exit_code().as_error() {
            return Err(err);
        }
        job.write(data, offset)
    }

    /// Release the network side of the job; the worker finishes on its own.
    pub fn close(&mut self) {
        self.job = None;
    }

    /// Stop the open job. Idempotent with [`close`](Self::close).
    pub fn abort(&mut self) {
        if let Some(job) = self.job.take() {
            job.abort();
        }
    }
}
