//! Process tree interface

/// Read access to the host process tree
///
/// Every accessor answers from the live tree and may race with process exit;
/// `None` means the information is gone or unreadable. Callers never treat a
/// vanished link as authorization.
pub trait ProcessTree: Send + Sync {
    /// Host-side parent of `pid`, or `None` if the process no longer exists
    fn parent(&self, pid: u32) -> Option<u32>;

    /// Namespace-local PID when `pid` lives inside a child PID namespace,
    /// `None` when the process is not namespaced
    fn ns_pid(&self, pid: u32) -> Option<u32>;

    /// Whether the process currently exists
    fn exists(&self, pid: u32) -> bool;

    /// Command name, when still readable
    fn comm(&self, pid: u32) -> Option<String>;

    /// Real uid of the owning user, when still readable
    fn owner_uid(&self, pid: u32) -> Option<u32>;
}
