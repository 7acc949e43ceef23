//! gpuward-enforce: Termination of unauthorized GPU processes
//!
//! Destructive action is isolated behind the [`signal::SignalSender`] trait
//! so dry-run mode can substitute a no-op sender without touching
//! classification.

pub mod enforcer;
pub mod signal;

pub use enforcer::Enforcer;
pub use signal::{KillCommand, NoopSender, SendOutcome, SignalSender};
