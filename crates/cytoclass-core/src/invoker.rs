//! Model invocation
//!
//! One scoring call runs one external process:
//! `<executable> <script> <comma-separated-features>`. Both output streams
//! are drained concurrently with the wait so a chatty model never blocks on
//! a full pipe. On Unix the model runs in its own process group, and the
//! whole group is killed if the deadline passes.

use crate::config::ModelConfig;
use crate::error::InvocationError;
use crate::types::FeatureVector;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;

const CHUNK_SIZE: usize = 4096;

/// Parsed stdout of a successful model process
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
    fields: Map<String, Value>,
}

impl RawModelOutput {
    /// Parse stdout text; it must hold a single JSON object
    ///
    /// # Errors
    /// `InvocationError::MalformedOutput` carrying the raw text.
    pub fn parse(stdout: &str) -> Result<Self, InvocationError> {
        let malformed = |reason: String| InvocationError::MalformedOutput {
            raw: stdout.to_string(),
            reason,
        };

        match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(malformed(format!("expected object, found {}", json_type(&other)))),
            Err(e) => Err(malformed(e.to_string())),
        }
    }

    /// Look up a field
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// All fields
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for RawModelOutput {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Scoring backend
///
/// The process-per-request implementation is [`ProcessInvoker`]; tests and
/// alternative backends substitute their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Score one feature vector
    async fn invoke(&self, features: &FeatureVector) -> Result<RawModelOutput, InvocationError>;
}

/// Invoker that spawns the scoring executable for every call
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    config: ModelConfig,
    permits: Option<Arc<Semaphore>>,
}

impl ProcessInvoker {
    /// Create invoker from model settings
    #[must_use]
    pub fn new(config: ModelConfig) -> Self {
        let permits = config.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        Self { config, permits }
    }

    /// Model settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Run `<executable> --version` and return its trimmed output
    ///
    /// # Errors
    /// `RuntimeUnavailable` when the executable cannot be launched or
    /// reports failure.
    pub async fn probe_runtime(&self) -> Result<String, InvocationError> {
        let output = Command::new(&self.config.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(&e))?;

        // Older interpreters print the version on stderr
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr)
        } else {
            String::from_utf8_lossy(&output.stdout)
        };

        if output.status.success() {
            Ok(text.trim().to_string())
        } else {
            Err(InvocationError::RuntimeUnavailable {
                executable: self.config.executable.clone(),
                reason: format!("version check exited with {}", output.status),
            })
        }
    }

    fn command(&self, features: &FeatureVector) -> Command {
        let mut cmd = Command::new(&self.config.executable);
        cmd.arg(&self.config.script_path)
            .arg(features.to_arg())
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONPATH", &self.config.resource_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn unavailable(&self, err: &std::io::Error) -> InvocationError {
        InvocationError::RuntimeUnavailable {
            executable: self.config.executable.clone(),
            reason: err.to_string(),
        }
    }

    async fn run(&self, features: &FeatureVector) -> Result<RawModelOutput, InvocationError> {
        let started = Instant::now();
        let mut child = self.command(features).spawn().map_err(|e| self.unavailable(&e))?;
        let pid = child.id();
        tracing::debug!(pid, script = %self.config.script_path.display(), "model process spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InvocationError::Io("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| InvocationError::Io("stderr not captured".to_string()))?;

        let completion = async {
            let (out, err, status) =
                tokio::join!(drain(stdout, "stdout"), drain(stderr, "stderr"), child.wait());
            (out, err, status)
        };

        let (out, err, status) = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, completion).await {
                Ok(done) => done,
                Err(_) => {
                    kill_process_group(pid).await;
                    if let Err(e) = child.kill().await {
                        tracing::warn!(pid, error = %e, "failed to kill timed out model process");
                    }
                    return Err(InvocationError::Timeout {
                        elapsed_ms: duration_ms(started),
                    });
                }
            },
            None => completion.await,
        };

        let status = status.map_err(|e| InvocationError::Io(e.to_string()))?;
        let stdout = out.map_err(|e| InvocationError::Io(e.to_string()))?;
        let stderr = err.map_err(|e| InvocationError::Io(e.to_string()))?;

        tracing::debug!(
            pid,
            exit = ?status.code(),
            elapsed_ms = duration_ms(started),
            "model process exited"
        );

        if !status.success() {
            return Err(InvocationError::ModelProcessFailed {
                exit_code: status.code(),
                stderr: stderr.trim_end().to_string(),
            });
        }

        RawModelOutput::parse(&stdout)
    }
}

#[async_trait]
impl ModelInvoker for ProcessInvoker {
    async fn invoke(&self, features: &FeatureVector) -> Result<RawModelOutput, InvocationError> {
        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|e| InvocationError::Io(e.to_string()))?,
            ),
            None => None,
        };
        self.run(features).await
    }
}

/// Read a stream to the end in chunks, tracing each chunk as it arrives
async fn drain<R>(mut reader: R, stream: &'static str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        tracing::trace!(stream, bytes = n, text = %String::from_utf8_lossy(&chunk[..n]), "model output");
        collected.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

/// SIGKILL every process in the group led by `pid`, including anything the
/// script forked
#[cfg(unix)]
async fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let result = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {
            tracing::debug!(pid, "model process group killed");
        }
        Ok(status) => tracing::warn!(pid, %status, "kill of model process group failed"),
        Err(e) => tracing::warn!(pid, error = %e, "kill of model process group failed"),
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: Option<u32>) {}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validate;
    use serde_json::json;

    #[test]
    fn parse_accepts_object_with_surrounding_whitespace() {
        let raw = RawModelOutput::parse(
            "\n{\"prediction\":1,\"tumor_type\":\"maligno\",\"probability\":0.92}\n",
        )
        .unwrap();
        assert_eq!(raw.get("prediction"), Some(&json!(1)));
        assert_eq!(raw.fields().len(), 3);
    }

    #[test]
    fn parse_rejects_text_and_non_objects() {
        let err = RawModelOutput::parse("Traceback (most recent call last)").unwrap_err();
        assert!(matches!(
            err,
            InvocationError::MalformedOutput { ref raw, .. } if raw == "Traceback (most recent call last)"
        ));

        let err = RawModelOutput::parse("[1, 2]").unwrap_err();
        match err {
            InvocationError::MalformedOutput { reason, .. } => assert!(reason.contains("array")),
            other => panic!("expected MalformedOutput, got {other:?}"),
        }

        assert!(RawModelOutput::parse("").is_err());
    }

    #[tokio::test]
    async fn missing_executable_is_runtime_unavailable() {
        let invoker = ProcessInvoker::new(ModelConfig::new(
            "/nonexistent/cytoclass-python",
            "model.py",
        ));
        let features = validate(&json!([1, 1, 1, 1, 1, 1, 1, 1, 1])).unwrap();

        let err = invoker.invoke(&features).await.unwrap_err();
        assert!(matches!(err, InvocationError::RuntimeUnavailable { .. }));

        let err = invoker.probe_runtime().await.unwrap_err();
        assert!(matches!(err, InvocationError::RuntimeUnavailable { .. }));
    }

    #[tokio::test]
    async fn mock_invoker_substitutes_process() {
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke().times(1).returning(|_| {
            Err(InvocationError::Timeout { elapsed_ms: 5 })
        });
        let features = validate(&json!([2, 2, 2, 2, 2, 2, 2, 2, 2])).unwrap();
        let invoker: &dyn ModelInvoker = &mock;
        assert!(invoker.invoke(&features).await.is_err());
    }
}
