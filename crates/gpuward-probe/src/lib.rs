//! gpuward-probe: External data sources
//!
//! The device inventory and the scheduler job index are independent,
//! externally-observed views of the host, re-read from scratch every cycle.
//! Both sit behind async traits so a cycle can run against scripted mocks.

pub mod device;
pub mod mock;
pub mod scheduler;

pub use device::{DeviceQuery, NvmlReader, SmiReader};
pub use scheduler::{JobIndex, SlurmJobIndex};
