//! Classification of GPU-holding PIDs against the scheduler's job set

use crate::grace::GraceTable;
use gpuward_core::{
    AncestryEnd, Decision, GpuProcessEntry, GpuwardError, GpuwardResult, JobRecord, Verdict,
};
use gpuward_proc::resolver::AncestryResolver;
use gpuward_proc::tree::ProcessTree;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, warn};

/// Output of one classification pass
#[derive(Debug)]
pub struct Classification {
    /// One decision per inventory entry, in inventory order
    pub decisions: Vec<Decision>,
    /// Decisions for PIDs unauthorized long enough to enforce, one per PID
    pub confirmed: Vec<Decision>,
    /// Distinct unauthorized PIDs still inside the grace window
    pub pending_grace: usize,
}

/// Labels each GPU-holding PID and owns the cross-cycle grace state
pub struct Classifier {
    grace: GraceTable,
    grace_cycles: u32,
    /// Completed classification passes; aborted cycles never reach this
    /// counter, so an abort cannot break an unauthorized streak
    seq: u64,
}

impl Classifier {
    pub fn new(grace_cycles: u32) -> Self {
        Self {
            grace: GraceTable::new(),
            grace_cycles: grace_cycles.max(1),
            seq: 0,
        }
    }

    /// Classify one cycle's inventory against the scheduler's job set
    ///
    /// Total: every inventory entry yields exactly one decision. The job-id
    /// invariant (an authorized decision must reference a job active this
    /// cycle) is validated before any grace-state mutation, so a failed pass
    /// leaves the cross-cycle state untouched.
    pub fn classify(
        &mut self,
        cycle: u64,
        inventory: &[GpuProcessEntry],
        jobs: &[JobRecord],
        tree: &dyn ProcessTree,
    ) -> GpuwardResult<Classification> {
        let mut root_jobs: HashMap<u32, &JobRecord> = HashMap::new();
        for job in jobs {
            for &root in &job.launch_roots {
                root_jobs.insert(root, job);
            }
        }
        // Roots of inactive jobs stay walkable so "job no longer active" is
        // distinguishable from "no match at all".
        let all_roots: HashSet<u32> = root_jobs.keys().copied().collect();
        let active_jobs: HashSet<&str> = jobs
            .iter()
            .filter(|j| j.state.is_active())
            .map(|j| j.job_id.as_str())
            .collect();

        let resolver = AncestryResolver::new(tree);
        let mut decisions = Vec::with_capacity(inventory.len());
        for entry in inventory {
            decisions.push(Self::decide(entry, tree, &resolver, &all_roots, &root_jobs));
        }

        for decision in &decisions {
            if let Some(job_id) = &decision.job_id {
                if !active_jobs.contains(job_id.as_str()) {
                    error!(
                        pid = decision.pid,
                        job_id = %job_id,
                        "Decision references a job not active this cycle"
                    );
                    return Err(GpuwardError::DataInconsistency(format!(
                        "decision for pid {} references inactive job {}",
                        decision.pid, job_id
                    )));
                }
            }
        }

        // Invariant holds; commit the grace-state updates.
        self.seq += 1;
        let mut confirmed = Vec::new();
        let mut confirmed_pids: HashSet<u32> = HashSet::new();
        let mut pending_pids: HashSet<u32> = HashSet::new();
        for decision in &decisions {
            if decision.verdict != Verdict::Unauthorized {
                continue;
            }
            let streak = self
                .grace
                .observe(decision.pid, decision.device_id, self.seq);
            if streak >= self.grace_cycles {
                if confirmed_pids.insert(decision.pid) {
                    warn!(
                        pid = decision.pid,
                        device_id = decision.device_id,
                        streak,
                        reason = %decision.reason,
                        "Unauthorized process confirmed for enforcement"
                    );
                    confirmed.push(decision.clone());
                }
            } else {
                warn!(
                    pid = decision.pid,
                    device_id = decision.device_id,
                    streak,
                    reason = %decision.reason,
                    "Unauthorized process inside grace window"
                );
                pending_pids.insert(decision.pid);
            }
        }

        let live: HashSet<u32> = inventory.iter().map(|e| e.pid).collect();
        let pruned = self.grace.prune(&live);
        if pruned > 0 {
            debug!(cycle, pruned, "Pruned grace entries for departed PIDs");
        }

        Ok(Classification {
            decisions,
            confirmed,
            pending_grace: pending_pids.len(),
        })
    }

    fn decide(
        entry: &GpuProcessEntry,
        tree: &dyn ProcessTree,
        resolver: &AncestryResolver<'_>,
        all_roots: &HashSet<u32>,
        root_jobs: &HashMap<u32, &JobRecord>,
    ) -> Decision {
        let owner_uid = tree.owner_uid(entry.pid);
        let command = tree.comm(entry.pid);

        let path = resolver.resolve(entry.pid, all_roots);
        let (verdict, job_id, reason) = match path.end {
            AncestryEnd::MatchedRoot(root) => {
                // present by construction: the resolver only matches members
                // of the root set handed to it
                let job = root_jobs[&root];
                if job.state.is_active() {
                    (
                        Verdict::Authorized,
                        Some(job.job_id.clone()),
                        format!("ancestor {} is a launch root of job {}", root, job.job_id),
                    )
                } else {
                    (
                        Verdict::Unauthorized,
                        None,
                        format!(
                            "launch root {} belongs to job {} which is no longer active",
                            root, job.job_id
                        ),
                    )
                }
            }
            AncestryEnd::ReachedInit => (
                Verdict::Unauthorized,
                None,
                format!(
                    "no ancestor of {} matches any scheduler launch root",
                    entry.pid
                ),
            ),
            AncestryEnd::Unresolvable(detail) => (
                Verdict::Unauthorized,
                None,
                format!("ancestry resolution failed: {}", detail),
            ),
        };

        Decision {
            pid: entry.pid,
            device_id: entry.device_id,
            memory_bytes: entry.memory_bytes,
            verdict,
            job_id,
            reason,
            owner_uid,
            command,
        }
    }

    /// Number of PIDs currently tracked in the grace window
    pub fn tracked(&self) -> usize {
        self.grace.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gpuward_core::JobState;
    use gpuward_proc::fake::FakeTree;

    fn entry(pid: u32, device_id: u32) -> GpuProcessEntry {
        GpuProcessEntry {
            pid,
            device_id,
            memory_bytes: 1 << 20,
            observed_at: Utc::now(),
        }
    }

    fn job(job_id: &str, roots: &[u32], state: JobState) -> JobRecord {
        JobRecord::new(
            job_id.to_string(),
            "alice".to_string(),
            roots.iter().copied().collect(),
            state,
        )
    }

    #[test]
    fn test_descendant_of_active_root_is_authorized() {
        let tree = FakeTree::new()
            .with_process(500, 1)
            .with_process(8000, 500)
            .with_process(9001, 8000);
        let jobs = vec![job("J1", &[500], JobState::Running)];
        let mut classifier = Classifier::new(2);

        let result = classifier
            .classify(1, &[entry(9001, 0)], &jobs, &tree)
            .unwrap();

        assert_eq!(result.decisions.len(), 1);
        let decision = &result.decisions[0];
        assert_eq!(decision.verdict, Verdict::Authorized);
        assert_eq!(decision.job_id.as_deref(), Some("J1"));
        assert!(result.confirmed.is_empty());
        assert_eq!(result.pending_grace, 0);
    }

    #[test]
    fn test_orphan_is_unauthorized_pending_grace() {
        let tree = FakeTree::new().with_process(700, 1);
        let mut classifier = Classifier::new(2);

        let result = classifier
            .classify(1, &[entry(700, 0)], &[], &tree)
            .unwrap();

        assert_eq!(result.decisions[0].verdict, Verdict::Unauthorized);
        assert!(result.decisions[0].job_id.is_none());
        assert!(result.confirmed.is_empty());
        assert_eq!(result.pending_grace, 1);
    }

    #[test]
    fn test_confirmed_after_grace_cycles() {
        let tree = FakeTree::new().with_process(700, 1);
        let mut classifier = Classifier::new(2);

        let first = classifier
            .classify(1, &[entry(700, 0)], &[], &tree)
            .unwrap();
        assert!(first.confirmed.is_empty());

        let second = classifier
            .classify(2, &[entry(700, 0)], &[], &tree)
            .unwrap();
        assert_eq!(second.confirmed.len(), 1);
        assert_eq!(second.confirmed[0].pid, 700);
        assert_eq!(second.pending_grace, 0);
    }

    #[test]
    fn test_inactive_job_root_is_unauthorized_with_reason() {
        let tree = FakeTree::new().with_process(500, 1).with_process(600, 500);
        let jobs = vec![job("J9", &[500], JobState::Other)];
        let mut classifier = Classifier::new(2);

        let result = classifier
            .classify(1, &[entry(600, 0)], &jobs, &tree)
            .unwrap();

        let decision = &result.decisions[0];
        assert_eq!(decision.verdict, Verdict::Unauthorized);
        assert!(decision.job_id.is_none());
        assert!(decision.reason.contains("no longer active"));
    }

    #[test]
    fn test_vanished_chain_is_unauthorized() {
        // parent link points at a process that already exited
        let tree = FakeTree::new().with_process(300, 200);
        let mut classifier = Classifier::new(2);

        let result = classifier
            .classify(1, &[entry(300, 0)], &[], &tree)
            .unwrap();

        assert_eq!(result.decisions[0].verdict, Verdict::Unauthorized);
        assert!(result.decisions[0].reason.contains("resolution failed"));
    }

    #[test]
    fn test_same_pid_on_two_devices_confirms_once() {
        let tree = FakeTree::new().with_process(700, 1);
        let mut classifier = Classifier::new(1);

        let result = classifier
            .classify(1, &[entry(700, 0), entry(700, 1)], &[], &tree)
            .unwrap();

        assert_eq!(result.decisions.len(), 2);
        assert_eq!(result.confirmed.len(), 1);
    }

    #[test]
    fn test_departed_pid_is_pruned() {
        let tree = FakeTree::new().with_process(700, 1);
        let mut classifier = Classifier::new(2);

        classifier
            .classify(1, &[entry(700, 0)], &[], &tree)
            .unwrap();
        assert_eq!(classifier.tracked(), 1);

        classifier.classify(2, &[], &[], &tree).unwrap();
        assert_eq!(classifier.tracked(), 0);
    }

    #[test]
    fn test_decision_carries_process_enrichment() {
        let tree = FakeTree::new()
            .with_process(700, 1)
            .with_comm(700, "miner")
            .with_uid(700, 1001);
        let mut classifier = Classifier::new(2);

        let result = classifier
            .classify(1, &[entry(700, 0)], &[], &tree)
            .unwrap();

        assert_eq!(result.decisions[0].command.as_deref(), Some("miner"));
        assert_eq!(result.decisions[0].owner_uid, Some(1001));
    }
}
