use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::error::ExecutionError;
use super::types::{Artifact, ExecutionRequest};
use super::workspace::WorkDir;
use super::CodeRunner;

const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Runs each script in a fresh interpreter process on the host.
///
/// The child inherits the host environment and working directory so that
/// installed plotting libraries and relative artifact paths resolve the
/// same way they would for the user. Output is captured up to
/// `max_output_bytes` per stream; the rest is drained and dropped.
pub struct SubprocessRunner {
    interpreter: PathBuf,
    work_dir: WorkDir,
    max_output_bytes: usize,
}

impl SubprocessRunner {
    pub fn new(interpreter: impl Into<PathBuf>, work_dir: WorkDir) -> Self {
        Self {
            interpreter: interpreter.into(),
            work_dir,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    fn build_command(&self, script_path: &Path) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script_path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

async fn drain_capped<R>(reader: Option<R>, max_bytes: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Vec::new();
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = max_bytes.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    buf
}

#[async_trait]
impl CodeRunner for SubprocessRunner {
    async fn run(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<Artifact, ExecutionError> {
        self.work_dir.ensure()?;
        let script_path = self.work_dir.script_path(&request.id);
        tokio::fs::write(&script_path, &request.source).await?;

        // The artifact must come from this run, not a previous one with the same id.
        match tokio::fs::remove_file(&request.artifact_path).await {
            Ok(()) => {
                tracing::debug!(path = %request.artifact_path.display(), "Removed stale artifact");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            id = %request.id,
            script = %script_path.display(),
            "Executing diagram script"
        );

        let started_at = chrono::Utc::now().timestamp_millis();
        let mut child = self.build_command(&script_path).spawn().map_err(|e| {
            ExecutionError::Environment(format!(
                "failed to spawn {}: {e}",
                self.interpreter.display()
            ))
        })?;

        let max_bytes = self.max_output_bytes;
        let stdout_task = tokio::spawn(drain_capped(child.stdout.take(), max_bytes));
        let stderr_task = tokio::spawn(drain_capped(child.stderr.take(), max_bytes));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(ExecutionError::Environment(format!("wait failed: {e}")));
            }
            Err(_elapsed) => {
                tracing::warn!(
                    id = %request.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Diagram script timed out, killing"
                );
                let _ = child.kill().await;
                // Grandchildren may still hold the pipes open.
                stdout_task.abort();
                stderr_task.abort();
                return Err(ExecutionError::Timeout(timeout));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let finished_at = chrono::Utc::now().timestamp_millis();

        if !stdout.is_empty() {
            tracing::debug!(
                id = %request.id,
                stdout = %String::from_utf8_lossy(&stdout),
                "Diagram script output"
            );
        }

        if !status.success() {
            return Err(ExecutionError::Crashed {
                code: status.code(),
                stderr,
            });
        }

        let exists = tokio::fs::try_exists(&request.artifact_path)
            .await
            .unwrap_or(false);
        if !exists {
            return Err(ExecutionError::MissingArtifact {
                path: request.artifact_path.clone(),
                stderr,
            });
        }

        Ok(Artifact {
            path: request.artifact_path.clone(),
            script_path,
            started_at_unix_ms: started_at,
            finished_at_unix_ms: finished_at,
        })
    }
}
