//! gpuward-audit: Append-only audit log
//!
//! Every classification and every enforcement outcome is recorded, durable
//! and ordered, independent of transient process state. Decisions are
//! flushed before any signal is sent; outcomes are flushed before the cycle
//! is considered complete.

pub mod record;
pub mod sink;

pub use record::AuditRecord;
pub use sink::{AuditSink, FileSink, MemorySink};
