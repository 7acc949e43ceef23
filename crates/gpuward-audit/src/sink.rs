//! Audit sinks

use crate::record::AuditRecord;
use async_trait::async_trait;
use gpuward_core::GpuwardResult;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Append-only destination for audit records
///
/// `append` preserves call order. `flush` must make every appended record
/// durable before returning; prior entries are never rewritten or deleted.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> GpuwardResult<()>;
    async fn flush(&self) -> GpuwardResult<()>;
}

/// Audit log backed by an append-only JSONL file
pub struct FileSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileSink {
    /// Open the audit file for appending, creating it and its directory if
    /// needed; existing content is never truncated
    pub async fn open(path: PathBuf) -> GpuwardResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
                info!(path = %parent.display(), "Created audit log directory");
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn append(&self, record: &AuditRecord) -> GpuwardResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> GpuwardResult<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

/// In-memory sink for tests
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far, in order
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, record: &AuditRecord) -> GpuwardResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn flush(&self) -> GpuwardResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuward_core::{Decision, Verdict};
    use uuid::Uuid;

    fn sample_record(cycle: u64) -> AuditRecord {
        AuditRecord::decision(
            Uuid::new_v4(),
            cycle,
            Decision {
                pid: 500,
                device_id: 0,
                memory_bytes: 2048,
                verdict: Verdict::Unauthorized,
                job_id: None,
                reason: "test".to_string(),
                owner_uid: None,
                command: None,
            },
        )
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "gpuward-audit-{}-{}.jsonl",
            std::process::id(),
            name
        ))
    }

    #[tokio::test]
    async fn test_file_sink_appends_one_line_per_record() {
        let path = temp_path("lines");
        let _ = std::fs::remove_file(&path);

        let sink = FileSink::open(path.clone()).await.unwrap();
        sink.append(&sample_record(1)).await.unwrap();
        sink.append(&sample_record(2)).await.unwrap();
        sink.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let record: AuditRecord = serde_json::from_str(line).unwrap();
            assert!(record.cycle() >= 1);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_reopening_never_truncates() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        {
            let sink = FileSink::open(path.clone()).await.unwrap();
            sink.append(&sample_record(1)).await.unwrap();
            sink.flush().await.unwrap();
        }
        {
            let sink = FileSink::open(path.clone()).await.unwrap();
            sink.append(&sample_record(2)).await.unwrap();
            sink.flush().await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_memory_sink_preserves_order() {
        let sink = MemorySink::new();
        sink.append(&sample_record(1)).await.unwrap();
        sink.append(&sample_record(2)).await.unwrap();
        sink.flush().await.unwrap();

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cycle(), 1);
        assert_eq!(records[1].cycle(), 2);
    }
}
