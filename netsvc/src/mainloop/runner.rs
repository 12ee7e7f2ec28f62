//! Main loop runner.
//!
//! The driver is polled: every iteration runs the context's phases once,
//! then sleeps until the next timer or the idle interval, whichever comes
//! first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use log::{debug, info};
use smoltcp::time::Instant;

use super::context::{HandOff, NetworkContext, Services};
use crate::config::NetsvcConfig;
use crate::driver::EthernetDriver;

/// Time source for the loop.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Milliseconds since construction.
pub struct MonotonicClock {
    start: std::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.start.elapsed().as_micros() as i64)
    }
}

/// Main loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct MainLoopConfig {
    /// Longest sleep between polls.
    pub idle_sleep: StdDuration,
    /// Iterations slower than this are logged.
    pub timing_warning: StdDuration,
}

impl Default for MainLoopConfig {
    fn default() -> Self {
        Self {
            idle_sleep: StdDuration::from_millis(1),
            timing_warning: StdDuration::from_millis(5),
        }
    }
}

/// Single iteration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationResult {
    Continue,
    /// Control passed to the host's reboot path.
    Rebooting,
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Rebooting,
    Stopped,
    /// `netsvc.disable` was set; nothing was started.
    Disabled,
}

/// Run a single main loop iteration, including any boot hand-off it asks for.
pub fn run_iteration<D: EthernetDriver>(
    ctx: &mut NetworkContext<D>,
    now: Instant,
    config: &MainLoopConfig,
) -> IterationResult {
    let started = std::time::Instant::now();
    let mut result = IterationResult::Continue;
    if let Some(action) = ctx.poll(now) {
        if ctx.hand_off(action) == HandOff::Rebooting {
            result = IterationResult::Rebooting;
        }
    }
    let elapsed = started.elapsed();
    if elapsed > config.timing_warning {
        debug!("mainloop: iteration took {} ms", elapsed.as_millis());
    }
    result
}

/// Serve until the host reboots or `stop` is raised.
pub fn run<D: EthernetDriver>(
    ctx: &mut NetworkContext<D>,
    clock: &dyn Clock,
    config: &MainLoopConfig,
    stop: &AtomicBool,
) -> RunExit {
    info!("mainloop: serving as {}", ctx.nodename());
    while !stop.load(Ordering::Relaxed) {
        let now = clock.now();
        if run_iteration(ctx, now, config) == IterationResult::Rebooting {
            return RunExit::Rebooting;
        }
        let mut sleep = config.idle_sleep;
        if let Some(deadline) = ctx.next_deadline() {
            let now = clock.now();
            let until = if deadline > now { (deadline - now).total_micros() } else { 0 };
            sleep = sleep.min(StdDuration::from_micros(until));
        }
        if !sleep.is_zero() {
            std::thread::sleep(sleep);
        }
    }
    info!("mainloop: stopped");
    RunExit::Stopped
}

/// Build the context for `driver` and serve on it.
///
/// # Returns
/// [`RunExit::Disabled`] without touching the driver when the subsystem is
/// switched off.
pub fn serve<D: EthernetDriver>(
    config: &NetsvcConfig,
    driver: D,
    services: Services,
    stop: &AtomicBool,
) -> RunExit {
    if config.disabled {
        info!("mainloop: disabled by configuration");
        return RunExit::Disabled;
    }
    let mut ctx = NetworkContext::new(config, driver, services);
    run(&mut ctx, &MonotonicClock::new(), &MainLoopConfig::default(), stop)
}
