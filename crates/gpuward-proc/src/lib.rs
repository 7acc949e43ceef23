//! gpuward-proc: Host process tree access and ancestry resolution
//!
//! The process tree is read through the [`tree::ProcessTree`] trait so the
//! resolver and its callers can run against an in-memory tree in tests.

pub mod fake;
pub mod procfs;
pub mod resolver;
pub mod tree;

pub use fake::FakeTree;
pub use procfs::ProcfsTree;
pub use resolver::AncestryResolver;
pub use tree::ProcessTree;
