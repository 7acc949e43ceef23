//! Audit record shapes

use chrono::{DateTime, Utc};
use gpuward_core::{Decision, EnforcementOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line in the audit stream
///
/// Records carry the daemon run id and the monotonic cycle identifier so
/// entries remain attributable across restarts. Enforcement records take
/// their timestamp from the outcome itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "lowercase")]
pub enum AuditRecord {
    /// A classification produced this cycle
    Decision {
        run_id: Uuid,
        cycle: u64,
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        decision: Decision,
    },
    /// An enforcement action's result
    Enforcement {
        run_id: Uuid,
        cycle: u64,
        #[serde(flatten)]
        outcome: EnforcementOutcome,
    },
}

impl AuditRecord {
    pub fn decision(run_id: Uuid, cycle: u64, decision: Decision) -> Self {
        AuditRecord::Decision {
            run_id,
            cycle,
            timestamp: Utc::now(),
            decision,
        }
    }

    pub fn enforcement(run_id: Uuid, cycle: u64, outcome: EnforcementOutcome) -> Self {
        AuditRecord::Enforcement {
            run_id,
            cycle,
            outcome,
        }
    }

    /// Cycle the record belongs to
    pub fn cycle(&self) -> u64 {
        match self {
            AuditRecord::Decision { cycle, .. } => *cycle,
            AuditRecord::Enforcement { cycle, .. } => *cycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuward_core::{ExitStatus, Signal, Verdict};

    fn sample_decision() -> Decision {
        Decision {
            pid: 500,
            device_id: 0,
            memory_bytes: 2048,
            verdict: Verdict::Unauthorized,
            job_id: None,
            reason: "no ancestor of 500 matches any scheduler launch root".to_string(),
            owner_uid: Some(1000),
            command: Some("python".to_string()),
        }
    }

    #[test]
    fn test_decision_record_json_shape() {
        let record = AuditRecord::decision(Uuid::new_v4(), 7, sample_decision());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["record"], "decision");
        assert_eq!(json["cycle"], 7);
        assert_eq!(json["pid"], 500);
        assert_eq!(json["verdict"], "unauthorized");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_enforcement_record_json_shape() {
        let outcome = EnforcementOutcome {
            pid: 500,
            signal_sent: Signal::Kill,
            exit_status: ExitStatus::Succeeded,
            timestamp: Utc::now(),
        };
        let record = AuditRecord::enforcement(Uuid::new_v4(), 7, outcome);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["record"], "enforcement");
        assert_eq!(json["signal_sent"], "SIGKILL");
        assert_eq!(json["exit_status"], "succeeded");
    }

    #[test]
    fn test_record_roundtrip() {
        let record = AuditRecord::decision(Uuid::new_v4(), 3, sample_decision());
        let line = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.cycle(), 3);
    }
}
