//! procfs-backed process tree

use crate::tree::ProcessTree;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Maximum size for a single /proc file read
///
/// status and comm entries are well under 1 KiB; the cap bounds reads
/// against oversized procfs entries.
const MAX_PROC_READ: u64 = 4096;

/// Process tree backed by the host procfs
#[derive(Debug, Clone)]
pub struct ProcfsTree {
    root: PathBuf,
}

impl ProcfsTree {
    /// Tree rooted at /proc
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }

    /// Tree rooted at an alternate path (tests)
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn read_bounded(&self, path: &Path) -> Option<String> {
        let file = fs::File::open(path).ok()?;
        let mut buf = String::new();
        file.take(MAX_PROC_READ).read_to_string(&mut buf).ok()?;
        Some(buf)
    }

    /// Value of a `Key:`-prefixed line in the status file
    fn status_field(&self, pid: u32, key: &str) -> Option<String> {
        let content = self.read_bounded(&self.pid_dir(pid).join("status"))?;
        content
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .map(|rest| rest.trim().to_string())
    }
}

impl Default for ProcfsTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTree for ProcfsTree {
    fn parent(&self, pid: u32) -> Option<u32> {
        self.status_field(pid, "PPid:")?.parse().ok()
    }

    fn ns_pid(&self, pid: u32) -> Option<u32> {
        // NSpid lists the PID once per namespace level, host view first; a
        // single entry means the process is not in a child PID namespace.
        let field = self.status_field(pid, "NSpid:")?;
        let ids: Vec<u32> = field
            .split_whitespace()
            .filter_map(|t| t.parse().ok())
            .collect();
        if ids.len() > 1 {
            ids.last().copied()
        } else {
            None
        }
    }

    fn exists(&self, pid: u32) -> bool {
        self.pid_dir(pid).exists()
    }

    fn comm(&self, pid: u32) -> Option<String> {
        self.read_bounded(&self.pid_dir(pid).join("comm"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn owner_uid(&self, pid: u32) -> Option<u32> {
        // Uid: real, effective, saved, filesystem
        self.status_field(pid, "Uid:")?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "gpuward-procfs-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    fn write_status(root: &Path, pid: u32, status: &str, comm: &str) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("status"), status).unwrap();
        fs::write(dir.join("comm"), format!("{}\n", comm)).unwrap();
    }

    #[test]
    fn test_parent_and_owner_from_status() {
        let root = fake_proc("parent");
        write_status(
            &root,
            4242,
            "Name:\ttrainer\nPPid:\t100\nUid:\t1000\t1000\t1000\t1000\nNSpid:\t4242\n",
            "trainer",
        );

        let tree = ProcfsTree::with_root(root);
        assert_eq!(tree.parent(4242), Some(100));
        assert_eq!(tree.owner_uid(4242), Some(1000));
        assert_eq!(tree.comm(4242), Some("trainer".to_string()));
        assert!(tree.exists(4242));
        assert!(!tree.exists(4243));
    }

    #[test]
    fn test_ns_pid_only_for_namespaced_processes() {
        let root = fake_proc("nspid");
        write_status(&root, 500, "PPid:\t1\nNSpid:\t500\n", "bash");
        write_status(&root, 600, "PPid:\t500\nNSpid:\t600\t7\n", "python");

        let tree = ProcfsTree::with_root(root);
        assert_eq!(tree.ns_pid(500), None);
        assert_eq!(tree.ns_pid(600), Some(7));
    }

    #[test]
    fn test_vanished_process_reads_none() {
        let root = fake_proc("gone");
        let tree = ProcfsTree::with_root(root);
        assert_eq!(tree.parent(9999), None);
        assert_eq!(tree.comm(9999), None);
        assert_eq!(tree.owner_uid(9999), None);
    }
}
