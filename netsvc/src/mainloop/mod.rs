//! Main loop module.
//!
//! # Architecture
//!
//! - `context` - [`NetworkContext`]: every piece of event-loop state, and the
//!   four poll phases
//! - `runner` - iteration runner, clock and the blocking `run` entry point
//!
//! # Usage
//!
//! ```ignore
//! let mut ctx = NetworkContext::new(&config, driver, services);
//! let exit = run(&mut ctx, &MonotonicClock::new(), &MainLoopConfig::default(), &stop);
//! ```

pub mod context;
pub mod runner;

pub use context::{HandOff, NetworkContext, Services};
pub use runner::{run, run_iteration, serve, Clock, IterationResult, MainLoopConfig, MonotonicClock, RunExit};
