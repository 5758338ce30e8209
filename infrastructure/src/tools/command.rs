//! Command execution tool: run_command
//!
//! Commands run in a spawned shell with a cleared environment, the
//! workspace as working directory, and their own process group. Teardown
//! on timeout kills the whole group so no grandchild survives the call.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proxy_domain::{PermissionClass, ToolCall, ToolDefinition, ToolError, ToolParameter};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};

use super::registry::ToolHandler;
use crate::workspace::PathGuard;

pub const RUN_COMMAND: &str = "run_command";

/// Maximum captured bytes per stream (stdout, stderr).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Minimal PATH for the cleared environment.
const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

pub fn run_command_definition() -> ToolDefinition {
    ToolDefinition::new(
        RUN_COMMAND,
        "Execute a shell command in the workspace and return its output. Requires confirmation.",
        PermissionClass::ConfirmRequired,
    )
    .with_parameter(ToolParameter::new("command", "The command to execute", true))
}

pub struct RunCommandTool {
    guard: Arc<PathGuard>,
    timeout: Duration,
}

impl RunCommandTool {
    pub fn new(guard: Arc<PathGuard>, timeout: Duration) -> Self {
        Self { guard, timeout }
    }
}

#[async_trait]
impl ToolHandler for RunCommandTool {
    async fn run(&self, call: &ToolCall) -> Result<String, ToolError> {
        let command = call.require_string("command").map_err(ToolError::parameter)?;
        info!(command, "run_command");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command])
            .current_dir(self.guard.root())
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("HOME", self.guard.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so group-kill on timeout reaches grandchildren.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::execution_failed(format!("failed to spawn shell: {e}")))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        // Drain both pipes concurrently so a chatty stream can never
        // block the other side past the kernel pipe buffer.
        let stdout_task = async move {
            let mut buf = Vec::new();
            let mut truncated = false;
            if let Some(mut pipe) = stdout_pipe {
                truncated = read_capped(&mut pipe, &mut buf).await.unwrap_or(false);
            }
            (buf, truncated)
        };
        let stderr_task = async move {
            let mut buf = Vec::new();
            let mut truncated = false;
            if let Some(mut pipe) = stderr_pipe {
                truncated = read_capped(&mut pipe, &mut buf).await.unwrap_or(false);
            }
            (buf, truncated)
        };

        let outcome = tokio::time::timeout(self.timeout, async {
            let (stdout, stderr) = tokio::join!(stdout_task, stderr_task);
            let status = child.wait().await;
            (stdout, stderr, status)
        })
        .await;

        let ((stdout, stdout_truncated), (stderr, stderr_truncated), status) = match outcome {
            Ok(parts) => parts,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Command timed out, killing group");
                kill_group(&child);
                let _ = child.kill().await;
                return Err(ToolError::timeout(format!(
                    "command exceeded {} seconds and was terminated",
                    self.timeout.as_secs()
                )));
            }
        };

        let status = status
            .map_err(|e| ToolError::execution_failed(format!("failed to await command: {e}")))?;

        let payload = serde_json::json!({
            "stdout": render_output(stdout, stdout_truncated),
            "stderr": render_output(stderr, stderr_truncated),
            "exit_code": status.code().unwrap_or(-1),
        });
        Ok(payload.to_string())
    }
}

/// Read at most `MAX_OUTPUT_SIZE` bytes, then drain the rest so the child
/// never blocks on a full pipe. Returns whether any bytes were dropped;
/// output that lands exactly on the cap is complete, not truncated.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<bool> {
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(truncated);
        }
        if buf.len() < MAX_OUTPUT_SIZE {
            let take = n.min(MAX_OUTPUT_SIZE - buf.len());
            buf.extend_from_slice(&chunk[..take]);
            if take < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }
}

fn render_output(bytes: Vec<u8>, truncated: bool) -> String {
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

#[cfg(unix)]
fn kill_group(child: &tokio::process::Child) {
    if let Some(pid) = child.id() {
        // The child is its own group leader (process_group(0)).
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &tokio::process::Child) {}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_domain::ToolErrorKind;
    use tempfile::TempDir;

    fn tool(timeout: Duration) -> (TempDir, RunCommandTool) {
        let dir = TempDir::new().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        (dir, RunCommandTool::new(guard, timeout))
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let (_dir, tool) = tool(Duration::from_secs(10));
        let call = ToolCall::new(RUN_COMMAND).with_arg("command", "echo hello");
        let payload = tool.run(&call).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["stdout"].as_str().unwrap().trim(), "hello");
        assert_eq!(value["exit_code"], 0);
    }

    #[tokio::test]
    async fn captures_stderr_and_nonzero_exit() {
        let (_dir, tool) = tool(Duration::from_secs(10));
        let call = ToolCall::new(RUN_COMMAND).with_arg("command", "echo oops >&2; exit 3");
        let payload = tool.run(&call).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["stderr"].as_str().unwrap().trim(), "oops");
        assert_eq!(value["exit_code"], 3);
    }

    #[tokio::test]
    async fn runs_in_workspace_root() {
        let (_dir, tool) = tool(Duration::from_secs(10));
        let call = ToolCall::new(RUN_COMMAND).with_arg("command", "touch created.txt");
        tool.run(&call).await.unwrap();
        assert!(tool.guard.root().join("created.txt").exists());
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        // SAFETY: test-local variable, no concurrent env readers.
        unsafe { std::env::set_var("PROXY_SECRET_MARKER", "leaked") };
        let (_dir, tool) = tool(Duration::from_secs(10));
        let call = ToolCall::new(RUN_COMMAND).with_arg("command", "env");
        let payload = tool.run(&call).await.unwrap();
        assert!(!payload.contains("PROXY_SECRET_MARKER"));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let (_dir, tool) = tool(Duration::from_millis(200));
        let call = ToolCall::new(RUN_COMMAND).with_arg("command", "sleep 30");
        let err = tool.run(&call).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::ExecutionTimeout);
    }

    #[tokio::test]
    async fn large_output_is_truncated_with_marker() {
        let (_dir, tool) = tool(Duration::from_secs(30));
        // ~2 MB of output against a 1 MB cap.
        let call = ToolCall::new(RUN_COMMAND)
            .with_arg("command", "yes 0123456789abcdef | head -c 2097152");
        let payload = tool.run(&call).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let stdout = value["stdout"].as_str().unwrap();
        assert!(stdout.ends_with(TRUNCATION_MARKER));
        assert!(stdout.len() <= MAX_OUTPUT_SIZE + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn output_exactly_at_the_cap_is_not_marked_truncated() {
        let (_dir, tool) = tool(Duration::from_secs(30));
        let call = ToolCall::new(RUN_COMMAND)
            .with_arg("command", format!("yes 0123456789abcdef | head -c {}", MAX_OUTPUT_SIZE));
        let payload = tool.run(&call).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let stdout = value["stdout"].as_str().unwrap();
        assert_eq!(stdout.len(), MAX_OUTPUT_SIZE);
        assert!(!stdout.ends_with(TRUNCATION_MARKER));
    }
}
