//! Signal delivery behind the privilege boundary

use async_trait::async_trait;
use gpuward_core::Signal;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of a single signal send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Signal delivered
    Delivered,
    /// Target exited before the signal landed
    NoSuchProcess,
    /// The privilege boundary rejected the signal
    PermissionDenied,
    /// Any other delivery failure
    Failed(String),
}

/// Sends termination signals across the privilege boundary
///
/// The target process usually belongs to another user, so the real sender
/// goes through an external privilege-escalation mechanism rather than
/// raw syscalls.
#[async_trait]
pub trait SignalSender: Send + Sync {
    async fn send(&self, pid: u32, signal: Signal) -> SendOutcome;

    /// Sender name for logs
    fn name(&self) -> &'static str;
}

/// Sender that shells out to kill(1), optionally through sudo
pub struct KillCommand {
    use_sudo: bool,
}

impl KillCommand {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    fn signal_flag(signal: Signal) -> &'static str {
        match signal {
            Signal::Term => "-TERM",
            Signal::Kill => "-KILL",
        }
    }
}

#[async_trait]
impl SignalSender for KillCommand {
    async fn send(&self, pid: u32, signal: Signal) -> SendOutcome {
        let mut cmd = if self.use_sudo {
            let mut c = Command::new("sudo");
            // -n: fail instead of prompting when sudo wants a password
            c.arg("-n").arg("kill");
            c
        } else {
            Command::new("kill")
        };
        cmd.arg(Self::signal_flag(signal)).arg(pid.to_string());

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                debug!(pid, signal = %signal, "Signal delivered");
                SendOutcome::Delivered
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).to_ascii_lowercase();
                if stderr.contains("no such process") {
                    SendOutcome::NoSuchProcess
                } else if stderr.contains("not permitted") || stderr.contains("password is required")
                {
                    SendOutcome::PermissionDenied
                } else {
                    SendOutcome::Failed(format!(
                        "kill exited with {}: {}",
                        output.status,
                        stderr.trim()
                    ))
                }
            }
            Err(e) => SendOutcome::Failed(format!("failed to run kill: {}", e)),
        }
    }

    fn name(&self) -> &'static str {
        "kill"
    }
}

/// No-op sender for dry-run mode
pub struct NoopSender;

#[async_trait]
impl SignalSender for NoopSender {
    async fn send(&self, pid: u32, signal: Signal) -> SendOutcome {
        warn!(pid, signal = %signal, "Dry run, signal not sent");
        SendOutcome::Delivered
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Test sender that records every send and replays scripted outcomes
///
/// An exhausted outcome queue answers `Delivered`.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(u32, Signal)>>,
    outcomes: Mutex<VecDeque<SendOutcome>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next send
    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Every (pid, signal) pair sent so far, in order
    pub fn sent(&self) -> Vec<(u32, Signal)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSender for RecordingSender {
    async fn send(&self, pid: u32, signal: Signal) -> SendOutcome {
        self.sent.lock().unwrap().push((pid, signal));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Delivered)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_flags() {
        assert_eq!(KillCommand::signal_flag(Signal::Term), "-TERM");
        assert_eq!(KillCommand::signal_flag(Signal::Kill), "-KILL");
    }

    #[tokio::test]
    async fn test_noop_sender_always_delivers() {
        let sender = NoopSender;
        assert_eq!(sender.send(1234, Signal::Term).await, SendOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_recording_sender_replays_outcomes() {
        let sender = RecordingSender::new();
        sender.push_outcome(SendOutcome::NoSuchProcess);

        assert_eq!(sender.send(500, Signal::Term).await, SendOutcome::NoSuchProcess);
        assert_eq!(sender.send(500, Signal::Kill).await, SendOutcome::Delivered);
        assert_eq!(
            sender.sent(),
            vec![(500, Signal::Term), (500, Signal::Kill)]
        );
    }
}
