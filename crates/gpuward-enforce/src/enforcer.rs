//! Termination with graceful-to-forceful escalation

use crate::signal::{SendOutcome, SignalSender};
use chrono::Utc;
use gpuward_core::{Decision, EnforcementOutcome, ExitStatus, Signal};
use gpuward_proc::tree::ProcessTree;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Issues termination for confirmed-unauthorized PIDs
///
/// Escalation is one step: SIGTERM, a fixed wait, then SIGKILL if the
/// process survived. Failures are recorded and surfaced, never retried
/// within the cycle; the classifier re-confirms the PID next cycle, so
/// retry is cycle-grained.
pub struct Enforcer {
    sender: Arc<dyn SignalSender>,
    tree: Arc<dyn ProcessTree>,
    escalation_wait: Duration,
    signal_timeout: Duration,
}

impl Enforcer {
    pub fn new(
        sender: Arc<dyn SignalSender>,
        tree: Arc<dyn ProcessTree>,
        escalation_wait: Duration,
        signal_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            tree,
            escalation_wait,
            signal_timeout,
        }
    }

    /// Terminate each confirmed PID once
    ///
    /// A PID that appears in several confirmed decisions (one per device) is
    /// signalled a single time.
    pub async fn enforce(&self, confirmed: &[Decision]) -> Vec<EnforcementOutcome> {
        let mut outcomes = Vec::new();
        let mut handled: HashSet<u32> = HashSet::new();
        for decision in confirmed {
            if !handled.insert(decision.pid) {
                continue;
            }
            outcomes.push(self.terminate(decision).await);
        }
        outcomes
    }

    async fn send(&self, pid: u32, signal: Signal) -> SendOutcome {
        match tokio::time::timeout(self.signal_timeout, self.sender.send(pid, signal)).await {
            Ok(outcome) => outcome,
            Err(_) => SendOutcome::Failed(format!(
                "signal send timed out after {:?}",
                self.signal_timeout
            )),
        }
    }

    async fn terminate(&self, decision: &Decision) -> EnforcementOutcome {
        let pid = decision.pid;
        info!(
            pid,
            device_id = decision.device_id,
            owner_uid = decision.owner_uid,
            command = decision.command.as_deref().unwrap_or("<gone>"),
            reason = %decision.reason,
            "Terminating unauthorized process"
        );

        match self.send(pid, Signal::Term).await {
            SendOutcome::Delivered => {}
            SendOutcome::NoSuchProcess => {
                return outcome(pid, Signal::Term, ExitStatus::ProcessAlreadyGone);
            }
            SendOutcome::PermissionDenied => {
                warn!(pid, "Permission denied sending SIGTERM");
                return outcome(pid, Signal::Term, ExitStatus::Failed);
            }
            SendOutcome::Failed(msg) => {
                warn!(pid, error = %msg, "Failed to send SIGTERM");
                return outcome(pid, Signal::Term, ExitStatus::Failed);
            }
        }

        tokio::time::sleep(self.escalation_wait).await;

        if !self.tree.exists(pid) {
            return outcome(pid, Signal::Term, ExitStatus::Succeeded);
        }

        // Survived the graceful signal
        match self.send(pid, Signal::Kill).await {
            SendOutcome::Delivered => {
                info!(pid, "Force kill was required");
                outcome(pid, Signal::Kill, ExitStatus::Succeeded)
            }
            SendOutcome::NoSuchProcess => {
                outcome(pid, Signal::Kill, ExitStatus::ProcessAlreadyGone)
            }
            SendOutcome::PermissionDenied => {
                warn!(pid, "Permission denied sending SIGKILL");
                outcome(pid, Signal::Kill, ExitStatus::Failed)
            }
            SendOutcome::Failed(msg) => {
                warn!(pid, error = %msg, "Failed to send SIGKILL");
                outcome(pid, Signal::Kill, ExitStatus::Failed)
            }
        }
    }
}

fn outcome(pid: u32, signal_sent: Signal, exit_status: ExitStatus) -> EnforcementOutcome {
    EnforcementOutcome {
        pid,
        signal_sent,
        exit_status,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::RecordingSender;
    use gpuward_core::Verdict;
    use gpuward_proc::fake::FakeTree;

    fn decision(pid: u32, device_id: u32) -> Decision {
        Decision {
            pid,
            device_id,
            memory_bytes: 1 << 20,
            verdict: Verdict::Unauthorized,
            job_id: None,
            reason: "no ancestor matches any scheduler launch root".to_string(),
            owner_uid: Some(1000),
            command: Some("python".to_string()),
        }
    }

    fn enforcer(sender: Arc<RecordingSender>, tree: FakeTree) -> Enforcer {
        Enforcer::new(
            sender,
            Arc::new(tree),
            Duration::ZERO,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_survivor_is_escalated_to_sigkill() {
        let sender = Arc::new(RecordingSender::new());
        // the process stays in the tree, so the TERM "did not take"
        let tree = FakeTree::new().with_process(500, 1);
        let enforcer = enforcer(Arc::clone(&sender), tree);

        let outcomes = enforcer.enforce(&[decision(500, 0)]).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].signal_sent, Signal::Kill);
        assert_eq!(outcomes[0].exit_status, ExitStatus::Succeeded);
        assert_eq!(sender.sent(), vec![(500, Signal::Term), (500, Signal::Kill)]);
    }

    #[tokio::test]
    async fn test_graceful_exit_needs_no_escalation() {
        let sender = Arc::new(RecordingSender::new());
        // process not in the tree: gone after SIGTERM
        let tree = FakeTree::new();
        let enforcer = enforcer(Arc::clone(&sender), tree);

        let outcomes = enforcer.enforce(&[decision(500, 0)]).await;

        assert_eq!(outcomes[0].signal_sent, Signal::Term);
        assert_eq!(outcomes[0].exit_status, ExitStatus::Succeeded);
        assert_eq!(sender.sent(), vec![(500, Signal::Term)]);
    }

    #[tokio::test]
    async fn test_already_gone_is_not_a_failure() {
        let sender = Arc::new(RecordingSender::new());
        sender.push_outcome(SendOutcome::NoSuchProcess);
        let enforcer = enforcer(Arc::clone(&sender), FakeTree::new());

        let outcomes = enforcer.enforce(&[decision(500, 0)]).await;

        assert_eq!(outcomes[0].exit_status, ExitStatus::ProcessAlreadyGone);
        assert!(!outcomes[0].exit_status.is_failure());
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_is_surfaced_not_retried() {
        let sender = Arc::new(RecordingSender::new());
        sender.push_outcome(SendOutcome::PermissionDenied);
        let enforcer = enforcer(Arc::clone(&sender), FakeTree::new().with_process(500, 1));

        let outcomes = enforcer.enforce(&[decision(500, 0)]).await;

        assert_eq!(outcomes[0].exit_status, ExitStatus::Failed);
        // no escalation after a rejected TERM
        assert_eq!(sender.sent(), vec![(500, Signal::Term)]);
    }

    #[tokio::test]
    async fn test_one_enforcement_per_pid() {
        let sender = Arc::new(RecordingSender::new());
        let enforcer = enforcer(Arc::clone(&sender), FakeTree::new());

        let outcomes = enforcer
            .enforce(&[decision(500, 0), decision(500, 1)])
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(sender.sent().len(), 1);
    }
}
