//! Inventory, job, decision, and outcome type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A process observed holding GPU device memory
///
/// Produced fresh each polling cycle and superseded entirely by the next
/// cycle's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuProcessEntry {
    /// Host PID as reported by the device subsystem
    pub pid: u32,
    /// GPU device index
    pub device_id: u32,
    /// Device memory held, in bytes
    pub memory_bytes: u64,
    /// When the snapshot was taken
    pub observed_at: DateTime<Utc>,
}

/// Scheduler job state as reported for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Job steps are running
    Running,
    /// Job is finishing; its steps may still hold device memory
    Completing,
    /// Any other state the scheduler reports
    Other,
}

impl JobState {
    /// Whether processes of a job in this state are entitled to the device
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Running | JobState::Completing)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completing => write!(f, "COMPLETING"),
            JobState::Other => write!(f, "OTHER"),
        }
    }
}

/// A job the scheduler places on this host, authoritative for one cycle only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Scheduler job identifier
    pub job_id: String,
    /// User the job runs as
    pub owner_user: String,
    /// PIDs the scheduler directly created for the job: process-group or
    /// container roots, never descendants
    pub launch_roots: HashSet<u32>,
    /// Job state this cycle
    pub state: JobState,
}

impl JobRecord {
    /// Create a job record
    pub fn new(job_id: String, owner_user: String, launch_roots: HashSet<u32>, state: JobState) -> Self {
        Self {
            job_id,
            owner_user,
            launch_roots,
            state,
        }
    }
}

/// One step in a walk from a PID toward PID 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestryHop {
    /// PID as seen inside its own namespace
    pub pid: u32,
    /// PID as seen by the host
    pub host_pid: u32,
    /// Host-side parent, if the process still existed when read
    pub parent_pid: Option<u32>,
}

/// Where an ancestry walk ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AncestryEnd {
    /// An ancestor (by host or namespace-local PID) is a known launch root;
    /// carries the root as it appears in the launch-root set
    MatchedRoot(u32),
    /// Walked to the top of the tree without matching any launch root
    ReachedInit,
    /// The chain could not be fully resolved
    Unresolvable(String),
}

/// Result of resolving a PID against the launch-root set
///
/// Constructed on demand per classification, never persisted.
#[derive(Debug, Clone)]
pub struct AncestryPath {
    /// Hops visited, starting at the queried PID
    pub hops: Vec<AncestryHop>,
    /// Stop condition that ended the walk
    pub end: AncestryEnd,
}

/// Classification verdict for one GPU-holding PID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Authorized,
    Unauthorized,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Authorized => write!(f, "AUTHORIZED"),
            Verdict::Unauthorized => write!(f, "UNAUTHORIZED"),
        }
    }
}

/// One classification per inventory entry per cycle, immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Host PID the decision applies to
    pub pid: u32,
    /// Device the PID was observed on
    pub device_id: u32,
    /// Device memory the PID held at observation time
    pub memory_bytes: u64,
    /// The verdict
    pub verdict: Verdict,
    /// Active job the PID was traced to; present only when authorized
    pub job_id: Option<String>,
    /// Human-readable justification
    pub reason: String,
    /// Real uid of the process at classification time, when still readable
    pub owner_uid: Option<u32>,
    /// Command name of the process at classification time, when still readable
    pub command: Option<String>,
}

/// Termination signal, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "SIGTERM")]
    Term,
    #[serde(rename = "SIGKILL")]
    Kill,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Term => write!(f, "SIGTERM"),
            Signal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// How an enforcement attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// The process was terminated
    Succeeded,
    /// Signal delivery failed; surfaced, re-evaluated next cycle
    Failed,
    /// The process exited on its own before the signal landed
    ProcessAlreadyGone,
}

impl ExitStatus {
    /// ProcessAlreadyGone is success-equivalent, not a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitStatus::Failed)
    }
}

/// Result of acting on one confirmed-unauthorized PID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementOutcome {
    /// PID the signal was aimed at
    pub pid: u32,
    /// Last signal sent (SIGKILL when escalation was required)
    pub signal_sent: Signal,
    /// How the attempt ended
    pub exit_status: ExitStatus,
    /// When the outcome was determined
    pub timestamp: DateTime<Utc>,
}

/// Per-cycle summary surfaced to the external driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Monotonic cycle identifier
    pub cycle: u64,
    /// Inventory entries observed (one per PID per device)
    pub pids_seen: usize,
    /// Entries classified AUTHORIZED
    pub authorized: usize,
    /// Distinct PIDs classified UNAUTHORIZED but still inside the grace window
    pub unauthorized_pending_grace: usize,
    /// Enforcement actions taken
    pub enforced: usize,
    /// Enforcement actions that failed
    pub failures: usize,
}
