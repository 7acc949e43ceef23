//! Cross-cycle grace-period state
//!
//! The only mutable state that survives between cycles. Owned by the
//! classifier; an explicit prune step drops entries for PIDs that left
//! the inventory.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// One PID's standing in the grace window
#[derive(Debug, Clone)]
pub struct GraceEntry {
    /// When the current unauthorized streak started
    pub first_seen_unauthorized_at: DateTime<Utc>,
    /// Device the PID was first seen on
    pub device_id: u32,
    /// Classification sequence number of the last unauthorized observation
    last_seq: u64,
    /// Consecutive unauthorized observations ending at `last_seq`
    consecutive: u32,
}

impl GraceEntry {
    /// Length of the current unauthorized streak
    pub fn streak(&self) -> u32 {
        self.consecutive
    }
}

/// Mapping from PID to grace standing
#[derive(Debug, Default)]
pub struct GraceTable {
    entries: HashMap<u32, GraceEntry>,
}

impl GraceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unauthorized observation at sequence `seq`, returning the
    /// updated streak length
    ///
    /// A second observation at the same `seq` (the PID held memory on more
    /// than one device) does not extend the streak. A gap in `seq` (the PID
    /// was authorized, or absent, in between) restarts it.
    pub fn observe(&mut self, pid: u32, device_id: u32, seq: u64) -> u32 {
        match self.entries.get_mut(&pid) {
            Some(entry) if entry.last_seq == seq => entry.consecutive,
            Some(entry) if entry.last_seq + 1 == seq => {
                entry.last_seq = seq;
                entry.consecutive += 1;
                entry.consecutive
            }
            _ => {
                self.entries.insert(
                    pid,
                    GraceEntry {
                        first_seen_unauthorized_at: Utc::now(),
                        device_id,
                        last_seq: seq,
                        consecutive: 1,
                    },
                );
                1
            }
        }
    }

    /// Drop entries for PIDs no longer present in the inventory
    pub fn prune(&mut self, live: &HashSet<u32>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|pid, _| live.contains(pid));
        before - self.entries.len()
    }

    pub fn get(&self, pid: u32) -> Option<&GraceEntry> {
        self.entries.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
