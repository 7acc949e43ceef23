//! gpuward-classify: Classification and the grace-period policy
//!
//! This crate labels each GPU-holding PID against the scheduler's job set:
//! - Ancestry-based authorization decisions
//! - The cross-cycle grace window before enforcement
//! - Pruning of state for PIDs that left the inventory

pub mod classifier;
pub mod grace;

pub use classifier::{Classification, Classifier};
pub use grace::GraceTable;
