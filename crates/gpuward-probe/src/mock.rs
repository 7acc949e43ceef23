//! Scripted mock backends for tests

use crate::device::DeviceQuery;
use crate::scheduler::JobIndex;
use async_trait::async_trait;
use gpuward_core::{GpuProcessEntry, GpuwardError, GpuwardResult, JobRecord};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Device query that replays pre-loaded snapshots in order
///
/// Each call to `query` consumes one queued response; an exhausted queue
/// answers with an empty inventory.
#[derive(Default)]
pub struct MockDeviceQuery {
    responses: Mutex<VecDeque<GpuwardResult<Vec<GpuProcessEntry>>>>,
}

impl MockDeviceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful snapshot
    pub fn push_snapshot(&self, entries: Vec<GpuProcessEntry>) {
        self.responses.lock().unwrap().push_back(Ok(entries));
    }

    /// Queue a query failure
    pub fn push_failure(&self, msg: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(GpuwardError::QueryUnavailable(msg.to_string())));
    }
}

#[async_trait]
impl DeviceQuery for MockDeviceQuery {
    async fn query(&self) -> GpuwardResult<Vec<GpuProcessEntry>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "mock-device"
    }
}

/// Job index that replays pre-loaded job sets in order
///
/// An exhausted queue answers with an empty job set (a successful
/// "no jobs running" response).
#[derive(Default)]
pub struct MockJobIndex {
    responses: Mutex<VecDeque<GpuwardResult<Vec<JobRecord>>>>,
}

impl MockJobIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful job set
    pub fn push_jobs(&self, jobs: Vec<JobRecord>) {
        self.responses.lock().unwrap().push_back(Ok(jobs));
    }

    /// Queue a query failure
    pub fn push_failure(&self, msg: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(GpuwardError::QueryUnavailable(msg.to_string())));
    }
}

#[async_trait]
impl JobIndex for MockJobIndex {
    async fn query(&self) -> GpuwardResult<Vec<JobRecord>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "mock-scheduler"
    }
}
