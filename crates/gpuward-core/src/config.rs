//! Configuration types for gpuward

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds to sleep between cycles
    pub interval_secs: u64,
    /// Device inventory configuration
    pub device: DeviceConfig,
    /// Scheduler query configuration
    pub scheduler: SchedulerConfig,
    /// Enforcement configuration
    pub enforce: EnforceConfig,
    /// Audit log configuration
    pub audit: AuditConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            device: DeviceConfig::default(),
            scheduler: SchedulerConfig::default(),
            enforce: EnforceConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::GpuwardError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::GpuwardError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::GpuwardError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Backend used to read the GPU process inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceSource {
    /// NVML library calls
    Nvml,
    /// nvidia-smi subprocess
    NvidiaSmi,
}

impl std::fmt::Display for DeviceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSource::Nvml => write!(f, "nvml"),
            DeviceSource::NvidiaSmi => write!(f, "nvidia-smi"),
        }
    }
}

/// Device inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Inventory backend
    pub source: DeviceSource,
    /// Path to the nvidia-smi binary
    pub smi_path: PathBuf,
    /// Query timeout; on expiry the cycle is aborted
    pub timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: DeviceSource::NvidiaSmi,
            smi_path: PathBuf::from("nvidia-smi"),
            timeout_secs: 10,
        }
    }
}

/// Scheduler query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Path to the squeue binary
    pub squeue_path: PathBuf,
    /// Path to the scontrol binary
    pub scontrol_path: PathBuf,
    /// Node name to filter jobs by; unset means the local hostname
    pub node: Option<String>,
    /// Query timeout; on expiry the cycle is aborted
    pub timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            squeue_path: PathBuf::from("squeue"),
            scontrol_path: PathBuf::from("scontrol"),
            node: None,
            timeout_secs: 10,
        }
    }
}

/// Enforcement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforceConfig {
    /// Classify but never send signals
    pub dry_run: bool,
    /// Send signals through sudo; the target usually belongs to another user
    pub use_sudo: bool,
    /// Consecutive UNAUTHORIZED cycles required before enforcement
    pub grace_cycles: u32,
    /// Seconds between the graceful signal and the forceful one
    pub escalation_wait_secs: u64,
    /// Timeout for a single signal send
    pub signal_timeout_secs: u64,
}

impl Default for EnforceConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            use_sudo: true,
            grace_cycles: 2,
            escalation_wait_secs: 5,
            signal_timeout_secs: 10,
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append-only JSONL file the audit records go to
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/gpuward/audit.jsonl"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
