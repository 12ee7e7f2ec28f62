//! State shared between the network side and the paver worker.
//!
//! # Architecture
//!
//! ```text
//! network thread                          worker thread
//!   JobHandle::write ──▶ StagingBuffer ◀── copy out / take
//!        │               committed (monotonic)
//!        └── wake (bounded(1)) ──────────▶ recv_timeout
//!   JobHandle::abort ──▶ CancelToken ────▶ checked at every wakeup
//! ```
//!
//! Dropping the [`JobHandle`] is the network side's close: it disconnects
//! the wake channel, and the job memory goes away when the worker drops its
//! side as well.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::trace;
use spin::Mutex;

use super::staging::StagingBuffer;
use crate::error::{NetsvcError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════

/// Cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════

/// Result of the last paver job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    Io = 1,
    TimedOut = 2,
    Canceled = 3,
    NoMemory = 4,
    NotSupported = 5,
}

impl ExitCode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Ok,
            2 => Self::TimedOut,
            3 => Self::Canceled,
            4 => Self::NoMemory,
            5 => Self::NotSupported,
            _ => Self::Io,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Status reported to a caller that ran into this exit code.
    pub fn as_error(self) -> Option<NetsvcError> {
        match self {
            Self::Ok => None,
            Self::Io => Some(NetsvcError::Io),
            Self::TimedOut => Some(NetsvcError::TimedOut),
            Self::Canceled => Some(NetsvcError::Canceled),
            Self::NoMemory => Some(NetsvcError::NoMemory),
            Self::NotSupported => Some(NetsvcError::NotSupported),
        }
    }
}

/// Paver pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PaverState {
    Idle = 0,
    /// Job open, waiting for data.
    Receiving = 1,
    /// Worker feeding the service incrementally.
    Streaming = 2,
    /// Payload complete, single provisioning call running.
    Monitoring = 3,
}

impl PaverState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Receiving,
            2 => Self::Streaming,
            3 => Self::Monitoring,
            _ => Self::Idle,
        }
    }
}

/// Status words readable from any thread.
#[derive(Debug, Default)]
pub struct PaverStatus {
    in_progress: AtomicBool,
    state: AtomicU8,
    exit_code: AtomicI32,
}

impl PaverStatus {
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PaverState {
        PaverState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from_raw(self.exit_code.load(Ordering::Acquire))
    }

    pub fn reset_exit_code(&self) {
        self.exit_code.store(ExitCode::Ok as i32, Ordering::Release);
    }

    pub(crate) fn set_state(&self, state: PaverState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn begin(&self) {
        self.exit_code.store(ExitCode::Ok as i32, Ordering::Release);
        self.set_state(PaverState::Receiving);
        self.in_progress.store(true, Ordering::Release);
    }

    /// Publish the exit code, then drop `in_progress` last.
    pub(crate) fn finish(&self, code: ExitCode) {
        self.exit_code.store(code as i32, Ordering::Release);
        self.set_state(PaverState::Idle);
        self.in_progress.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// JOB
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) struct JobShared {
    pub staging: Mutex<StagingBuffer>,
    pub total_size: u64,
    /// Highest byte offset written so far. Never decreases.
    pub committed: AtomicU64,
    pub cancel: CancelToken,
}

impl JobShared {
    pub fn new(staging: StagingBuffer) -> Self {
        Self {
            total_size: staging.len(),
            staging: Mutex::new(staging),
            committed: AtomicU64::new(0),
            cancel: CancelToken::new(),
        }
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }
}

/// Network side of a running job.
pub struct JobHandle {
    shared: Arc<JobShared>,
    wake: Sender<()>,
}

impl JobHandle {
    pub(crate) fn new(shared: Arc<JobShared>, wake: Sender<()>) -> Self {
        Self { shared, wake }
    }

    /// Stage `data` at `offset` and signal the worker.
    ///
    /// Anything reaching outside `[0, total_size)` is rejected.
    pub fn write(&self, data: &[u8], offset: u64) -> Result<()> {
        let total = self.shared.total_size;
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(NetsvcError::OutOfRange)?;
        if end > total || (!data.is_empty() && offset >= total) {
            return Err(NetsvcError::OutOfRange);
        }
        self.shared.staging.lock().write(offset, data)?;
        self.shared.committed.fetch_max(end, Ordering::AcqRel);
        self.signal();
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.shared.total_size
    }

    pub fn committed(&self) -> u64 {
        self.shared.committed()
    }

    /// Ask the worker to stop at its next wakeup.
    pub fn abort(&self) {
        self.shared.cancel.cancel();
        self.signal();
    }

    fn signal(&self) {
        // A pending wakeup already covers this one.
        if let Err(TrySendError::Disconnected(())) = self.wake.try_send(()) {
            trace!("paver: worker already gone");
        }
    }
}

/// Wake channel pair: at most one pending wakeup.
pub(crate) fn wake_channel() -> (Sender<()>, Receiver<()>) {
    crossbeam_channel::bounded(1)
}
