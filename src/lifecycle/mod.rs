//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load store → Build watchdog → Arm if uninitialized → Serve
//!
//! Watchdog (watchdog.rs):
//!     Armed → deadline → store query → satisfied | terminate process
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Disarm watchdog → Persist store → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store, then listener
//! - The shutdown scope doubles as the watchdog's outer cancellation scope
//! - Fail fast: any startup error is fatal

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod watchdog;

pub use shutdown::Shutdown;
pub use startup::{Console, StartupError};
pub use watchdog::{AdminWatchdog, TerminateHook};
