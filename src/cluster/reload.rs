//! Reload hooks fired after the trusted-peers list is rewritten.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Tells the cluster daemon to re-read its configuration.
///
/// Called once per successful write. Implementations must not block the
/// caller; a failed reload is logged, not returned.
pub trait ReloadHook: Send + Sync {
    fn reload(&self);
}

impl<H: ReloadHook + ?Sized> ReloadHook for Box<H> {
    fn reload(&self) {
        (**self).reload()
    }
}

impl<H: ReloadHook + ?Sized> ReloadHook for Arc<H> {
    fn reload(&self) {
        (**self).reload()
    }
}

/// Does nothing. Used when no reload command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReloadHook;

impl ReloadHook for NoopReloadHook {
    fn reload(&self) {
        info!("cluster config updated; no reload command configured");
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReloadCommandError {
    #[error("reload command is empty")]
    Empty,
}

/// Runs an external command, e.g. `systemctl reload ipfs-cluster`.
///
/// The command is split on whitespace; no shell is involved. It runs in the
/// background on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct CommandReloadHook {
    program: String,
    args: Vec<String>,
}

impl CommandReloadHook {
    pub fn parse(command: &str) -> Result<Self, ReloadCommandError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(ReloadCommandError::Empty)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the command to completion and report whether it exited cleanly.
    pub async fn run(&self) -> bool {
        match Command::new(&self.program).args(&self.args).status().await {
            Ok(status) if status.success() => {
                info!(command = %self.program, "cluster reload command succeeded");
                true
            }
            Ok(status) => {
                warn!(command = %self.program, %status, "cluster reload command failed");
                false
            }
            Err(e) => {
                warn!(command = %self.program, error = %e, "could not start cluster reload command");
                false
            }
        }
    }
}

impl ReloadHook for CommandReloadHook {
    fn reload(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let hook = self.clone();
                handle.spawn(async move {
                    hook.run().await;
                });
            }
            Err(_) => warn!(
                command = %self.program,
                "no async runtime available; cluster reload skipped"
            ),
        }
    }
}

/// Counts reloads. For tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingReloadHook {
    count: Arc<Mutex<usize>>,
}

impl RecordingReloadHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.lock().map(|c| *c).unwrap_or(0)
    }
}

impl ReloadHook for RecordingReloadHook {
    fn reload(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let hook = CommandReloadHook::parse("  systemctl reload  ipfs-cluster ").unwrap();
        assert_eq!(hook.program(), "systemctl");
        assert_eq!(hook.args(), ["reload", "ipfs-cluster"]);
    }

    #[test]
    fn test_parse_empty_command() {
        assert_eq!(
            CommandReloadHook::parse("   ").unwrap_err(),
            ReloadCommandError::Empty
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_exit_status() {
        assert!(CommandReloadHook::parse("true").unwrap().run().await);
        assert!(!CommandReloadHook::parse("false").unwrap().run().await);
        assert!(
            !CommandReloadHook::parse("/nonexistent/clustertrust-reload")
                .unwrap()
                .run()
                .await
        );
    }

    #[test]
    fn test_reload_outside_runtime_does_not_panic() {
        CommandReloadHook::parse("true").unwrap().reload();
    }

    #[test]
    fn test_recording_hook_through_box() {
        let recorder = RecordingReloadHook::new();
        let boxed: Box<dyn ReloadHook> = Box::new(recorder.clone());
        boxed.reload();
        boxed.reload();
        assert_eq!(recorder.count(), 2);
    }
}
