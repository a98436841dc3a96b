use crate::error::{Result, SandboxError};
use crate::runner::{Capability, ExecutionRequest, HostFunctions, ProgramRunner};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, trace};

/// Python entry harness. Loads the submission into a fresh namespace that
/// only exposes the declared host functions, then speaks the line protocol.
pub const PYTHON_HARNESS: &str = include_str!("harness.py");

const STDERR_CAPTURE_BYTES: u64 = 4096;

#[derive(Debug, Clone)]
pub struct ProcessRunnerConfig {
    /// Interpreter binary, resolved against `path_env`.
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    /// Harness source written next to the submission and passed before it.
    /// `None` runs the submission file directly.
    pub harness: Option<String>,
    /// Cap on bytes read from the program's stdout.
    pub max_output_bytes: usize,
    /// The only environment variable the child sees.
    pub path_env: String,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-I".to_string()],
            harness: Some(PYTHON_HARNESS.to_string()),
            max_output_bytes: 1024 * 1024,
            path_env: "/usr/local/bin:/usr/bin:/bin".to_string(),
        }
    }
}

/// Runs each program in a fresh interpreter process inside a private
/// temporary directory, with an empty environment.
///
/// Wire protocol (newline-delimited JSON):
/// - host -> program: `{"entry_point", "args", "capabilities"}` once
/// - program -> host: `{"call": name, "args": [...]}`, answered with
///   `{"ok": value}` or `{"error": msg}`
/// - program -> host: `{"result": value}` or `{"error": msg}` to finish
///
/// Any other stdout line is ignored.
pub struct ProcessRunner {
    config: ProcessRunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessRunnerConfig {
        &self.config
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(ProcessRunnerConfig::default())
    }
}

async fn write_line(stdin: &mut ChildStdin, message: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    stdin.write_all(&line).await?;
    stdin.flush().await?;
    Ok(())
}

#[async_trait]
impl ProgramRunner for ProcessRunner {
    async fn run(&self, request: &ExecutionRequest, host: &dyn HostFunctions) -> Result<Value> {
        let workdir = tempfile::Builder::new()
            .prefix("mathstake-run-")
            .tempdir()?;
        let code_path = workdir.path().join("submission.py");
        tokio::fs::write(&code_path, &request.code).await?;

        let mut command = Command::new(&self.config.interpreter);
        command.args(&self.config.interpreter_args);
        if let Some(harness) = &self.config.harness {
            let harness_path = workdir.path().join("harness.py");
            tokio::fs::write(&harness_path, harness).await?;
            command.arg(&harness_path);
        }
        command
            .arg(&code_path)
            .current_dir(workdir.path())
            .env_clear()
            .env("PATH", &self.config.path_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("{}: {}", self.config.interpreter, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Spawn("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Spawn("stdout not captured".into()))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut captured = Vec::new();
                let mut limited = stderr.take(STDERR_CAPTURE_BYTES);
                let _ = limited.read_to_end(&mut captured).await;
                let mut rest = limited.into_inner();
                let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
                String::from_utf8_lossy(&captured).into_owned()
            })
        });

        let envelope = json!({
            "entry_point": request.entry_point,
            "args": request.args,
            "capabilities": request.capabilities,
        });
        if let Err(e) = write_line(&mut stdin, &envelope).await {
            // The program may exit before reading; its output decides the outcome.
            debug!(error = %e, "Request envelope not delivered");
        }

        let limit = self.config.max_output_bytes;
        let mut lines = BufReader::new(stdout.take(limit as u64)).lines();
        let mut consumed = 0usize;

        let outcome: Result<Value> = loop {
            let Some(line) = lines.next_line().await? else {
                break if consumed >= limit {
                    Err(SandboxError::OutputLimit(limit))
                } else {
                    Err(SandboxError::NoResult(String::new()))
                };
            };
            consumed += line.len() + 1;

            let Ok(Value::Object(mut message)) = serde_json::from_str::<Value>(&line) else {
                trace!(line = %line, "Ignoring non-protocol output");
                continue;
            };

            if let Some(name) = message.get("call").and_then(Value::as_str) {
                let capability = match Capability::from_name(name) {
                    Some(c) if request.allows(c) => c,
                    _ => break Err(SandboxError::CapabilityDenied(name.to_string())),
                };
                let args = message
                    .get("args")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let reply = match host.call(capability, &args).await {
                    Ok(value) => json!({ "ok": value }),
                    Err(e) => json!({ "error": e.to_string() }),
                };
                trace!(capability = %capability, "Host call served");
                write_line(&mut stdin, &reply).await?;
                continue;
            }

            if let Some(result) = message.remove("result") {
                break Ok(result);
            }

            if let Some(error) = message.remove("error") {
                let text = match error {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                break Err(SandboxError::ProgramError(text));
            }

            trace!(line = %line, "Ignoring unrecognised message");
        };

        drop(stdin);
        let _ = child.start_kill();
        let _ = child.wait().await;

        match outcome {
            Err(SandboxError::NoResult(_)) => {
                let stderr = match stderr_task {
                    Some(task) => task.await.unwrap_or_default(),
                    None => String::new(),
                };
                let last_line = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                Err(SandboxError::NoResult(last_line))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_python_harness() {
        let config = ProcessRunnerConfig::default();
        assert_eq!(config.interpreter, "python3");
        let harness = config.harness.unwrap();
        assert!(harness.contains("def fetch_stock"));
        assert!(harness.contains("entry_point"));
    }
}
