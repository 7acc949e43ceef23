//! Scheduler job index

use async_trait::async_trait;
use gpuward_core::{GpuwardError, GpuwardResult, JobRecord, JobState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, trace};

/// Source of the scheduler's view of jobs on this host
#[async_trait]
pub trait JobIndex: Send + Sync {
    /// Jobs the scheduler currently places on this host
    ///
    /// An empty Ok result means the scheduler answered and reported no jobs.
    /// "No jobs" is never inferred from a failed query: a failure here must
    /// abort the cycle, or every GPU user would look unauthorized.
    async fn query(&self) -> GpuwardResult<Vec<JobRecord>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Job index backed by Slurm's squeue and scontrol
///
/// squeue lists the jobs on the node; `scontrol listpids` supplies the PIDs
/// Slurm itself created for each job, which are the launch roots descendants
/// are resolved against.
pub struct SlurmJobIndex {
    squeue_path: PathBuf,
    scontrol_path: PathBuf,
    node: Option<String>,
}

impl SlurmJobIndex {
    pub fn new(squeue_path: PathBuf, scontrol_path: PathBuf, node: Option<String>) -> Self {
        Self {
            squeue_path,
            scontrol_path,
            node,
        }
    }

    async fn run(program: &Path, args: &[&str]) -> GpuwardResult<std::process::Output> {
        Command::new(program).args(args).output().await.map_err(|e| {
            GpuwardError::QueryUnavailable(format!("failed to run {}: {}", program.display(), e))
        })
    }

    /// Parse `job_id|user|state` rows
    fn parse_jobs(raw: &str) -> GpuwardResult<Vec<(String, String, JobState)>> {
        let mut rows = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.trim().split('|').collect();
            if fields.len() != 3 || fields[0].is_empty() || fields[1].is_empty() {
                return Err(GpuwardError::QueryMalformed(format!(
                    "bad squeue row: {:?}",
                    line
                )));
            }
            let state = match fields[2] {
                "RUNNING" => JobState::Running,
                "COMPLETING" => JobState::Completing,
                _ => JobState::Other,
            };
            rows.push((fields[0].to_string(), fields[1].to_string(), state));
        }
        Ok(rows)
    }

    /// Parse `scontrol listpids` output for one job
    ///
    /// Format: a `PID JOBID STEPID LOCALID GLOBALID` header followed by one
    /// row per process Slurm created. Sentinel rows with PID -1 are skipped.
    fn parse_listpids(raw: &str, job_id: &str) -> HashSet<u32> {
        let mut pids = HashSet::new();
        for line in raw.lines().skip_while(|l| l.trim_start().starts_with("PID")) {
            let mut fields = line.split_whitespace();
            let (Some(pid), Some(row_job)) = (fields.next(), fields.next()) else {
                continue;
            };
            if row_job != job_id {
                continue;
            }
            if let Ok(pid) = pid.parse::<u32>() {
                pids.insert(pid);
            }
        }
        pids
    }

    /// Launch roots for one job
    ///
    /// A job that finished between the squeue pass and this call reports
    /// "Invalid job id"; that race yields an empty root set, not a cycle
    /// abort, and the grace period absorbs the window.
    async fn list_pids(&self, job_id: &str) -> GpuwardResult<HashSet<u32>> {
        let output = Self::run(&self.scontrol_path, &["listpids", job_id]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Invalid job id") {
                trace!(job_id, "Job vanished between squeue and scontrol");
                return Ok(HashSet::new());
            }
            return Err(GpuwardError::QueryUnavailable(format!(
                "scontrol listpids {} exited with {}: {}",
                job_id,
                output.status,
                stderr.trim()
            )));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_listpids(&raw, job_id))
    }
}

#[async_trait]
impl JobIndex for SlurmJobIndex {
    async fn query(&self) -> GpuwardResult<Vec<JobRecord>> {
        let mut args = vec!["-h", "-t", "RUNNING,COMPLETING", "-o", "%A|%u|%T"];
        if let Some(node) = &self.node {
            args.push("-w");
            args.push(node);
        }

        let output = Self::run(&self.squeue_path, &args).await?;
        if !output.status.success() {
            return Err(GpuwardError::QueryUnavailable(format!(
                "squeue exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let rows = Self::parse_jobs(&raw)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (job_id, owner_user, state) in rows {
            let launch_roots = self.list_pids(&job_id).await?;
            jobs.push(JobRecord::new(job_id, owner_user, launch_roots, state));
        }

        debug!(jobs = jobs.len(), "Scheduler job index read");
        Ok(jobs)
    }

    fn name(&self) -> &'static str {
        "slurm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jobs() {
        let raw = "101|alice|RUNNING\n102|bob|COMPLETING\n103|carol|PENDING\n";
        let rows = SlurmJobIndex::parse_jobs(raw).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ("101".to_string(), "alice".to_string(), JobState::Running));
        assert_eq!(rows[1].2, JobState::Completing);
        assert_eq!(rows[2].2, JobState::Other);
    }

    #[test]
    fn test_parse_jobs_empty_is_no_jobs() {
        let rows = SlurmJobIndex::parse_jobs("").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_jobs_malformed_row_fails() {
        let err = SlurmJobIndex::parse_jobs("101 alice RUNNING\n").unwrap_err();
        assert!(matches!(err, GpuwardError::QueryMalformed(_)));
    }

    #[test]
    fn test_parse_listpids() {
        let raw = "PID      JOBID    STEPID   LOCALID GLOBALID\n\
                   6456     101      batch    0       0\n\
                   6460     101      0        0       0\n\
                   -1       101      extern   -       -\n\
                   7000     999      0        0       0\n";
        let pids = SlurmJobIndex::parse_listpids(raw, "101");
        assert_eq!(pids, [6456, 6460].into_iter().collect());
    }
}
