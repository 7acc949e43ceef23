//! The per-cycle reconciliation pipeline

use gpuward_audit::{AuditRecord, AuditSink};
use gpuward_classify::Classifier;
use gpuward_core::{CycleSummary, GpuwardError, GpuwardResult, Verdict};
use gpuward_enforce::Enforcer;
use gpuward_probe::{DeviceQuery, JobIndex};
use gpuward_proc::tree::ProcessTree;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Runs the full reconciliation pipeline once per invocation: read the
/// inventory and the job index, classify, enforce, log
///
/// Cycles never overlap: a cycle runs to completion before the next starts,
/// so the classifier's grace map needs no locking. A failed external query
/// aborts the cycle before any state mutation or enforcement.
pub struct Engine {
    device: Arc<dyn DeviceQuery>,
    jobs: Arc<dyn JobIndex>,
    tree: Arc<dyn ProcessTree>,
    classifier: Classifier,
    enforcer: Enforcer,
    audit: Arc<dyn AuditSink>,
    device_timeout: Duration,
    scheduler_timeout: Duration,
    run_id: Uuid,
    cycle: u64,
}

/// Timeouts for the two external queries
///
/// Expiry of either aborts the cycle, identically to a query failure.
#[derive(Debug, Clone, Copy)]
pub struct QueryTimeouts {
    pub device: Duration,
    pub scheduler: Duration,
}

impl Engine {
    pub fn new(
        device: Arc<dyn DeviceQuery>,
        jobs: Arc<dyn JobIndex>,
        tree: Arc<dyn ProcessTree>,
        classifier: Classifier,
        enforcer: Enforcer,
        audit: Arc<dyn AuditSink>,
        timeouts: QueryTimeouts,
    ) -> Self {
        Self {
            device,
            jobs,
            tree,
            classifier,
            enforcer,
            audit,
            device_timeout: timeouts.device,
            scheduler_timeout: timeouts.scheduler,
            run_id: Uuid::new_v4(),
            cycle: 0,
        }
    }

    /// Cycles attempted so far, aborted ones included
    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    /// Run one full cycle
    ///
    /// Every decision is appended to the audit log and flushed before any
    /// signal is sent; each outcome is appended after the action and flushed
    /// again before the summary is returned.
    pub async fn run_cycle(&mut self) -> GpuwardResult<CycleSummary> {
        self.cycle += 1;
        let cycle = self.cycle;
        debug!(cycle, "Cycle started");

        let inventory = tokio::time::timeout(self.device_timeout, self.device.query())
            .await
            .map_err(|_| {
                GpuwardError::QueryUnavailable(format!(
                    "device query timed out after {:?}",
                    self.device_timeout
                ))
            })??;

        let jobs = tokio::time::timeout(self.scheduler_timeout, self.jobs.query())
            .await
            .map_err(|_| {
                GpuwardError::QueryUnavailable(format!(
                    "scheduler query timed out after {:?}",
                    self.scheduler_timeout
                ))
            })??;

        let classification =
            self.classifier
                .classify(cycle, &inventory, &jobs, self.tree.as_ref())?;
        debug_assert_eq!(classification.decisions.len(), inventory.len());

        for decision in &classification.decisions {
            self.audit
                .append(&AuditRecord::decision(self.run_id, cycle, decision.clone()))
                .await?;
        }
        self.audit.flush().await?;

        let outcomes = self.enforcer.enforce(&classification.confirmed).await;
        for outcome in &outcomes {
            self.audit
                .append(&AuditRecord::enforcement(self.run_id, cycle, outcome.clone()))
                .await?;
        }
        self.audit.flush().await?;

        let summary = CycleSummary {
            cycle,
            pids_seen: inventory.len(),
            authorized: classification
                .decisions
                .iter()
                .filter(|d| d.verdict == Verdict::Authorized)
                .count(),
            unauthorized_pending_grace: classification.pending_grace,
            enforced: outcomes.len(),
            failures: outcomes
                .iter()
                .filter(|o| o.exit_status.is_failure())
                .count(),
        };

        info!(
            cycle,
            pids_seen = summary.pids_seen,
            authorized = summary.authorized,
            pending_grace = summary.unauthorized_pending_grace,
            enforced = summary.enforced,
            failures = summary.failures,
            "Cycle complete"
        );

        Ok(summary)
    }
}
