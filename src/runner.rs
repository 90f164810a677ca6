//! Compile-and-run step for generated tests.
//!
//! After the model produces a test class, a [`TestRunner`] decides whether
//! it is usable. [`CommandRunner`] writes the code to a file inside the
//! project under test and runs a shell command (typically `mvn -q test`)
//! with a timeout; exit status 0 is a pass.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use crate::config::RunnerConfig;

/// Runner output kept per attempt; longer output is cut from the front so
/// the compiler's final errors survive.
const MAX_OUTPUT_CHARS: usize = 8000;

/// Outcome of one run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    /// Combined stdout and stderr, tail-truncated.
    pub output: String,
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, test_code: &str) -> Result<RunOutcome>;
}

/// [`TestRunner`] that shells out to a configured command.
pub struct CommandRunner {
    command: String,
    test_file: PathBuf,
    workdir: Option<PathBuf>,
    timeout_secs: u64,
}

impl CommandRunner {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            command: config.command.clone(),
            test_file: config.test_file.clone(),
            workdir: config.workdir.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl TestRunner for CommandRunner {
    async fn run(&self, test_code: &str) -> Result<RunOutcome> {
        if let Some(parent) = self.test_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.test_file, test_code)
            .await
            .with_context(|| format!("Failed to write {}", self.test_file.display()))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!(command = %self.command, "running generated tests");
        match timeout(Duration::from_secs(self.timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let success = output.status.success();
                if !success {
                    warn!(code = ?output.status.code(), "test command failed");
                }
                Ok(RunOutcome {
                    success,
                    output: tail(&combined, MAX_OUTPUT_CHARS),
                })
            }
            Ok(Err(e)) => {
                Err(e).with_context(|| format!("Failed to execute '{}'", self.command))
            }
            Err(_) => Ok(RunOutcome {
                success: false,
                output: format!("Command timed out after {} seconds", self.timeout_secs),
            }),
        }
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
