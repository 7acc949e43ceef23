//! gpuward daemon
//!
//! Polls the GPU process inventory and the batch scheduler once per cycle
//! and terminates GPU-holding processes that cannot be traced to an
//! authorized job.

mod engine;

use clap::Parser;
use engine::{Engine, QueryTimeouts};
use gpuward_audit::{AuditSink, FileSink};
use gpuward_classify::Classifier;
use gpuward_core::{DaemonConfig, DeviceSource};
use gpuward_enforce::{Enforcer, KillCommand, NoopSender, SignalSender};
use gpuward_probe::{DeviceQuery, JobIndex, NvmlReader, SlurmJobIndex, SmiReader};
use gpuward_proc::{ProcessTree, ProcfsTree};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// gpuwardd - GPU exclusive-use enforcement daemon for batch-scheduled hosts
#[derive(Parser, Debug)]
#[command(name = "gpuwardd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit (for an external polling driver)
    #[arg(long)]
    once: bool,

    /// Classify without sending signals
    #[arg(long)]
    dry_run: bool,

    /// Seconds between cycles (overrides the config file)
    #[arg(long)]
    interval: Option<u64>,

    /// Audit log path (overrides the config file)
    #[arg(long)]
    audit_path: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if let Some(path) = args.audit_path {
        config.audit.path = path;
    }
    if args.dry_run {
        config.enforce.dry_run = true;
    }

    // Initialize logging
    let level = args
        .log_level
        .unwrap_or_else(|| config.logging.level.clone());
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    info!("Starting gpuward daemon v{}", env!("CARGO_PKG_VERSION"));

    let device: Arc<dyn DeviceQuery> = match config.device.source {
        DeviceSource::Nvml => Arc::new(NvmlReader::new()?),
        DeviceSource::NvidiaSmi => Arc::new(SmiReader::new(config.device.smi_path.clone())),
    };

    let node = match &config.scheduler.node {
        Some(node) if !node.is_empty() => Some(node.clone()),
        _ => local_hostname(),
    };
    let jobs: Arc<dyn JobIndex> = Arc::new(SlurmJobIndex::new(
        config.scheduler.squeue_path.clone(),
        config.scheduler.scontrol_path.clone(),
        node.clone(),
    ));

    let tree: Arc<dyn ProcessTree> = Arc::new(ProcfsTree::new());

    let sender: Arc<dyn SignalSender> = if config.enforce.dry_run {
        warn!("Dry-run mode, unauthorized processes will not be signalled");
        Arc::new(NoopSender)
    } else {
        Arc::new(KillCommand::new(config.enforce.use_sudo))
    };
    let enforcer = Enforcer::new(
        sender,
        Arc::clone(&tree),
        Duration::from_secs(config.enforce.escalation_wait_secs),
        Duration::from_secs(config.enforce.signal_timeout_secs),
    );

    let audit: Arc<dyn AuditSink> = Arc::new(FileSink::open(config.audit.path.clone()).await?);

    info!(
        source = %config.device.source,
        node = node.as_deref().unwrap_or("<all>"),
        audit = %config.audit.path.display(),
        grace_cycles = config.enforce.grace_cycles,
        interval_secs = config.interval_secs,
        "gpuward configured"
    );

    let mut engine = Engine::new(
        device,
        jobs,
        tree,
        Classifier::new(config.enforce.grace_cycles),
        enforcer,
        audit,
        QueryTimeouts {
            device: Duration::from_secs(config.device.timeout_secs),
            scheduler: Duration::from_secs(config.scheduler.timeout_secs),
        },
    );

    let interval = Duration::from_secs(config.interval_secs);
    loop {
        // One summary line per cycle on stdout, for the external driver.
        match engine.run_cycle().await {
            Ok(summary) => println!("{}", serde_json::to_string(&summary)?),
            Err(e) => {
                warn!(error = %e, "Cycle aborted");
                println!(
                    "{}",
                    serde_json::json!({
                        "cycle": engine.cycles_run(),
                        "status": "aborted",
                        "error": e.to_string(),
                    })
                );
            }
        }

        if args.once {
            break;
        }

        // Shutdown is only observed at the cycle boundary, so a cycle in
        // flight always completes its log-after-outcome step.
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

/// Node name for scheduler queries when the config leaves it unset
fn local_hostname() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
