//! GPU device inventory readers

use async_trait::async_trait;
use chrono::Utc;
use gpuward_core::{GpuProcessEntry, GpuwardError, GpuwardResult};
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::Nvml;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Source of the per-cycle GPU process inventory
#[async_trait]
pub trait DeviceQuery: Send + Sync {
    /// Snapshot every process currently holding device memory
    ///
    /// Any failure means the whole cycle must be abandoned; a partial or
    /// garbled inventory is never acted on.
    async fn query(&self) -> GpuwardResult<Vec<GpuProcessEntry>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Inventory reader backed by NVML
pub struct NvmlReader {
    nvml: Nvml,
}

impl NvmlReader {
    /// Initialize the NVML library
    pub fn new() -> GpuwardResult<Self> {
        let nvml = Nvml::init()
            .map_err(|e| GpuwardError::QueryUnavailable(format!("NVML init failed: {}", e)))?;
        Ok(Self { nvml })
    }
}

#[async_trait]
impl DeviceQuery for NvmlReader {
    async fn query(&self) -> GpuwardResult<Vec<GpuProcessEntry>> {
        let observed_at = Utc::now();
        let count = self
            .nvml
            .device_count()
            .map_err(|e| GpuwardError::QueryUnavailable(format!("NVML device count: {}", e)))?;

        let mut entries = Vec::new();
        for index in 0..count {
            let device = self.nvml.device_by_index(index).map_err(|e| {
                GpuwardError::QueryUnavailable(format!("NVML device {}: {}", index, e))
            })?;
            let procs = device.running_compute_processes().map_err(|e| {
                GpuwardError::QueryUnavailable(format!(
                    "NVML compute processes on device {}: {}",
                    index, e
                ))
            })?;
            for p in procs {
                let memory_bytes = match p.used_gpu_memory {
                    UsedGpuMemory::Used(bytes) => bytes,
                    UsedGpuMemory::Unavailable => 0,
                };
                entries.push(GpuProcessEntry {
                    pid: p.pid,
                    device_id: index,
                    memory_bytes,
                    observed_at,
                });
            }
        }

        debug!(gpus = count, processes = entries.len(), "Device inventory read");
        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "nvml"
    }
}

/// Inventory reader that shells out to nvidia-smi
///
/// Two invocations per query: a `--query-gpu` pass to map GPU UUIDs to
/// device indices, then a `--query-compute-apps` pass for the processes.
pub struct SmiReader {
    smi_path: PathBuf,
}

impl SmiReader {
    pub fn new(smi_path: PathBuf) -> Self {
        Self { smi_path }
    }

    async fn run(&self, args: &[&str]) -> GpuwardResult<String> {
        let output = Command::new(&self.smi_path)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                GpuwardError::QueryUnavailable(format!(
                    "failed to run {}: {}",
                    self.smi_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(GpuwardError::QueryUnavailable(format!(
                "{} exited with {}: {}",
                self.smi_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| GpuwardError::QueryMalformed(format!("non-utf8 nvidia-smi output: {}", e)))
    }

    /// Parse `index, uuid` rows into a UUID-to-index map
    fn parse_uuid_map(raw: &str) -> GpuwardResult<HashMap<String, u32>> {
        let mut map = HashMap::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let mut fields = line.split(',').map(str::trim);
            let (index, uuid) = match (fields.next(), fields.next()) {
                (Some(i), Some(u)) if !u.is_empty() => (i, u),
                _ => {
                    return Err(GpuwardError::QueryMalformed(format!(
                        "bad gpu row: {:?}",
                        line
                    )))
                }
            };
            let index: u32 = index.parse().map_err(|_| {
                GpuwardError::QueryMalformed(format!("bad gpu index in row: {:?}", line))
            })?;
            map.insert(uuid.to_string(), index);
        }
        Ok(map)
    }

    /// Parse `pid, gpu_uuid, used_memory` rows (memory in MiB)
    fn parse_compute_apps(
        raw: &str,
        uuid_map: &HashMap<String, u32>,
    ) -> GpuwardResult<Vec<GpuProcessEntry>> {
        let observed_at = Utc::now();
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 3 {
                return Err(GpuwardError::QueryMalformed(format!(
                    "bad compute-apps row: {:?}",
                    line
                )));
            }
            let pid: u32 = fields[0].parse().map_err(|_| {
                GpuwardError::QueryMalformed(format!("bad pid in row: {:?}", line))
            })?;
            let device_id = *uuid_map.get(fields[1]).ok_or_else(|| {
                GpuwardError::QueryMalformed(format!("unknown gpu uuid in row: {:?}", line))
            })?;
            let memory_mib: u64 = fields[2].parse().map_err(|_| {
                GpuwardError::QueryMalformed(format!("bad memory in row: {:?}", line))
            })?;
            entries.push(GpuProcessEntry {
                pid,
                device_id,
                memory_bytes: memory_mib * 1024 * 1024,
                observed_at,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl DeviceQuery for SmiReader {
    async fn query(&self) -> GpuwardResult<Vec<GpuProcessEntry>> {
        let gpus = self
            .run(&["--query-gpu=index,uuid", "--format=csv,noheader"])
            .await?;
        let uuid_map = Self::parse_uuid_map(&gpus)?;

        let apps = self
            .run(&[
                "--query-compute-apps=pid,gpu_uuid,used_memory",
                "--format=csv,noheader,nounits",
            ])
            .await?;
        let entries = Self::parse_compute_apps(&apps, &uuid_map)?;

        debug!(
            gpus = uuid_map.len(),
            processes = entries.len(),
            "Device inventory read"
        );
        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "nvidia-smi"
    }
}
