//! Paver worker thread body.
//!
//! One worker per job. It owns the provisioning session and its end of the
//! wake channel, and publishes the job's exit code through
//! [`PaverStatus`] before it exits.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use super::command::{Asset, PaverCommand, Slot, Strategy};
use super::job::{ExitCode, JobShared, PaverState, PaverStatus};
use super::service::{PaverError, PayloadStream, ProvisioningService};

/// Outcome of waiting for staged data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    Ready,
    TimedOut,
    Canceled,
}

/// Block until `needed` bytes are committed, the job is canceled, or no
/// data arrives for `timeout`.
fn wait_for(shared: &JobShared, wake: &Receiver<()>, timeout: Duration, needed: u64) -> Wait {
    loop {
        if shared.cancel.is_canceled() {
            return Wait::Canceled;
        }
        if shared.committed() >= needed {
            return Wait::Ready;
        }
        match wake.recv_timeout(timeout) {
            Ok(()) => continue,
            Err(err) => {
                if shared.cancel.is_canceled() {
                    return Wait::Canceled;
                }
                if shared.committed() >= needed {
                    return Wait::Ready;
                }
                if err == RecvTimeoutError::Disconnected {
                    // The network side closed or dropped its handle, so no
                    // write can reach this job again. Waiting out the deadline
                    // would only hold the paver slot.
                    debug!("paver: network side closed at {} of {} bytes", shared.committed(), needed);
                }
                return Wait::TimedOut;
            }
        }
    }
}

fn exit_code_for(err: &PaverError) -> ExitCode {
    match err {
        PaverError::StreamTimedOut => ExitCode::TimedOut,
        PaverError::StreamCanceled => ExitCode::Canceled,
        PaverError::Unsupported(_) => ExitCode::NotSupported,
        PaverError::Unavailable | PaverError::Failed(_) => ExitCode::Io,
    }
}

/// Incremental view of the staged payload for streaming jobs.
struct JobStream<'a> {
    shared: &'a JobShared,
    wake: &'a Receiver<()>,
    timeout: Duration,
    status: &'a PaverStatus,
    consumed: u64,
    ended: Option<ExitCode>,
}

impl PayloadStream for JobStream<'_> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, PaverError> {
        if self.consumed >= self.shared.total_size || buf.is_empty() {
            return Ok(0);
        }
        match wait_for(self.shared, self.wake, self.timeout, self.consumed + 1) {
            Wait::Ready => {}
            Wait::TimedOut => {
                self.ended = Some(ExitCode::TimedOut);
                return Err(PaverError::StreamTimedOut);
            }
            Wait::Canceled => {
                self.ended = Some(ExitCode::Canceled);
                return Err(PaverError::StreamCanceled);
            }
        }
        self.status.set_state(PaverState::Streaming);

        let available = self.shared.committed() - self.consumed;
        let want = buf.len().min(available as usize);
        let mut staging = self.shared.staging.lock();
        let n = staging.read(self.consumed, &mut buf[..want]);
        self.consumed += n as u64;
        staging.release_before(self.consumed);
        Ok(n)
    }
}

pub(crate) struct Worker {
    pub command: PaverCommand,
    pub shared: Arc<JobShared>,
    pub wake: Receiver<()>,
    pub timeout: Duration,
    pub service: Box<dyn ProvisioningService>,
    pub status: Arc<PaverStatus>,
}

impl Worker {
    /// Thread entry point.
    pub fn run(mut self) {
        info!("paver: {} started ({} bytes)", self.command, self.shared.total_size);
        let code = match self.command.strategy() {
            Strategy::Streaming => self.stream(),
            Strategy::Monitoring => self.monitor(),
        };
        match code {
            ExitCode::Ok => info!("paver: {} complete", self.command),
            ExitCode::Canceled => warn!("paver: {} canceled", self.command),
            other => error!("paver: {} failed: {:?}", self.command, other),
        }
        self.status.finish(code);
    }

    fn stream(&mut self) -> ExitCode {
        let mut stream = JobStream {
            shared: &self.shared,
            wake: &self.wake,
            timeout: self.timeout,
            status: &self.status,
            consumed: 0,
            ended: None,
        };
        let result = self.service.write_volumes(&mut stream);
        if let Some(code) = stream.ended {
            return code;
        }
        match result {
            Ok(()) if stream.consumed < self.shared.total_size => {
                warn!(
                    "paver: service stopped reading at {} of {} bytes",
                    stream.consumed, self.shared.total_size
                );
                ExitCode::Io
            }
            Ok(()) => ExitCode::Ok,
            Err(e) => {
                error!("paver: write_volumes: {}", e);
                exit_code_for(&e)
            }
        }
    }

    fn monitor(&mut self) -> ExitCode {
        match wait_for(&self.shared, &self.wake, self.timeout, self.shared.total_size) {
            Wait::Ready => {}
            Wait::TimedOut => return ExitCode::TimedOut,
            Wait::Canceled => return ExitCode::Canceled,
        }
        self.status.set_state(PaverState::Monitoring);

        let payload = self.shared.staging.lock().take_contiguous().unwrap_or_default();
        let result = self
            .provision(&payload)
            .and_then(|()| self.service.flush());
        match result {
            Ok(()) => ExitCode::Ok,
            Err(e) => {
                error!("paver: {}: {}", self.command, e);
                exit_code_for(&e)
            }
        }
    }

    fn provision(&mut self, payload: &[u8]) -> Result<(), PaverError> {
        let service = &mut self.service;
        match &self.command {
            PaverCommand::Asset { slot, asset } => {
                service.write_asset(*slot, *asset, payload)?;
                if *asset == Asset::Kernel && matches!(slot, Slot::A | Slot::B) {
                    service.set_configuration_active(*slot)?;
                }
                Ok(())
            }
            PaverCommand::Firmware { slot, kind } => service.write_firmware(*slot, kind, payload),
            PaverCommand::DataFile { path } => service.write_data_file(path, payload),
            PaverCommand::InitPartitionTables => service.init_partition_tables(),
            PaverCommand::WipePartitionTables => service.wipe_partition_tables(),
            PaverCommand::Fvm => Err(PaverError::Unsupported("fvm requires streaming".into())),
        }
    }
}
