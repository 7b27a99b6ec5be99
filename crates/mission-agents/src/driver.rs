//! Command-based automation driver.
//!
//! The configured command receives one JSON action request on stdin and must
//! print one JSON line `{"success": bool, "error"?: str, "screenshot_base64"?: str}`
//! on stdout. The last JSON-looking line wins, so drivers may log freely
//! before it.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use coordination::mission::{ActionOutcome, ActionRequest, AutomationDriver, DriverError};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct DriverReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    screenshot_base64: Option<String>,
}

/// Spawns the driver command once per action.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    program: String,
    args: Vec<String>,
}

impl CommandDriver {
    /// Split `command_line` with shell quoting rules.
    pub fn new(command_line: &str) -> Result<Self, DriverError> {
        let mut parts = shlex::split(command_line)
            .ok_or_else(|| DriverError::Fault(format!("unbalanced quotes in '{command_line}'")))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| DriverError::Fault("empty driver command".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn parse_reply(stdout: &str) -> Option<DriverReply> {
        stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|l| l.starts_with('{'))
            .find_map(|l| serde_json::from_str(l).ok())
    }

    fn outcome(reply: DriverReply) -> ActionOutcome {
        let screenshot = reply.screenshot_base64.and_then(|b64| match STANDARD.decode(b64) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable driver screenshot");
                None
            }
        });
        ActionOutcome {
            success: reply.success,
            error: reply.error,
            screenshot,
        }
    }

    async fn run(&self, payload: Vec<u8>) -> Result<std::process::Output, DriverError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Fault(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A driver that exits without reading stdin still gets its say on stdout.
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(DriverError::Fault(format!("failed to write request: {e}")));
                }
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| DriverError::Fault(format!("driver wait failed: {e}")))
    }
}

#[async_trait]
impl AutomationDriver for CommandDriver {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, DriverError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| DriverError::Fault(format!("failed to encode request: {e}")))?;

        let started = Instant::now();
        let output = tokio::time::timeout(Duration::from_millis(request.timeout_ms), self.run(payload))
            .await
            .map_err(|_| DriverError::Timeout {
                timeout_ms: request.timeout_ms,
                elapsed_ms: started.elapsed().as_millis() as u64,
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            program = %self.program,
            action = request.action.as_str(),
            status = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Driver call finished"
        );

        match Self::parse_reply(&stdout) {
            Some(reply) => Ok(Self::outcome(reply)),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let code = output.status.code().unwrap_or(-1);
                Err(DriverError::Fault(format!(
                    "driver exited with code {code} without a JSON reply: {}",
                    stderr.trim()
                )))
            }
        }
    }
}
