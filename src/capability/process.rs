//! External process capabilities.
//!
//! The entry point is a command line. The attempt's [`CapabilityInput`] is
//! written as JSON to stdin and a JSON object is read back from stdout.

use crate::capability::{into_result_map, Capability, CapabilityInput};
use crate::catalog::{CapabilityKind, ResultMap};
use crate::error::CapabilityError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProcessCapability {
    program: String,
    args: Vec<String>,
}

impl ProcessCapability {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line. No shell quoting is applied.
    pub fn from_entry_point(entry_point: &str) -> Result<Self, CapabilityError> {
        let mut parts = entry_point.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CapabilityError::InvalidEntryPoint {
                kind: CapabilityKind::Process.to_string(),
                entry_point: entry_point.to_string(),
            })?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl Capability for ProcessCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Process
    }

    async fn invoke(&self, input: CapabilityInput) -> Result<ResultMap, CapabilityError> {
        let payload = serde_json::to_vec(&input)
            .map_err(|e| CapabilityError::Invocation(format!("encode input: {}", e)))?;

        debug!(program = %self.program, frame_id = %input.frame_id, "Spawning capability process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CapabilityError::Invocation(format!("spawn {}: {}", self.program, e)))?;

        // Stdin is fed concurrently with draining stdout.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output
            .map_err(|e| CapabilityError::Invocation(format!("wait {}: {}", self.program, e)))?;
        if let Err(e) = fed {
            // A child that exits without reading its input is not an error.
            if output.status.success() && e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(CapabilityError::Invocation(format!("write stdin: {}", e)));
            }
            debug!(program = %self.program, error = %e, "Capability process closed stdin early");
        }

        if !output.status.success() {
            return Err(CapabilityError::ProcessExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let value = serde_json::from_slice(&output.stdout)
            .map_err(|e| CapabilityError::MalformedResult(format!("invalid json: {}", e)))?;
        into_result_map(value)
    }
}
