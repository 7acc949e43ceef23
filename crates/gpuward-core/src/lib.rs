//! gpuward-core: Core types for the gpuward enforcement daemon
//!
//! This crate provides the fundamental types used throughout gpuward:
//! - GPU inventory and scheduler job records
//! - Classification decisions and enforcement outcomes
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
