//! Testing utilities for the cytoclass workspace
//!
//! Stub model scripts and request fixtures shared by the crate test suites.
//! Stubs are POSIX `sh` scripts written into a temporary directory, so
//! tests never need a Python runtime.

#![allow(missing_docs)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Interpreter the stub scripts are written for
pub const STUB_INTERPRETER: &str = "sh";

/// A throwaway model script
///
/// The directory (and the script) is removed on drop.
#[derive(Debug)]
pub struct StubModel {
    dir: TempDir,
    script: PathBuf,
}

impl StubModel {
    /// Stub running `body` as its script
    pub fn from_body(body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("model.sh");
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        Self { dir, script }
    }

    /// Stub printing `value` as one line of JSON
    pub fn json(value: &Value) -> Self {
        Self::raw(&value.to_string())
    }

    /// Stub printing `stdout` verbatim and exiting 0
    pub fn raw(stdout: &str) -> Self {
        Self::from_body(&format!("printf '%s\\n' {}", quote(stdout)))
    }

    /// Stub writing `stderr` and exiting with `code`
    pub fn failing(code: i32, stderr: &str) -> Self {
        Self::from_body(&format!("printf '%s' {} >&2\nexit {code}", quote(stderr)))
    }

    /// Stub that outlives any sensible timeout
    pub fn sleeping(secs: u64) -> Self {
        Self::from_body(&format!("exec sleep {secs}"))
    }

    /// Stub printing `value` after waiting `delay`
    pub fn delayed(value: &Value, delay: Duration) -> Self {
        Self::from_body(&format!(
            "sleep {:.3}\nprintf '%s\\n' {}",
            delay.as_secs_f64(),
            quote(&value.to_string())
        ))
    }

    /// Stub printing `first` on odd-numbered calls and `second` on even ones
    ///
    /// The call count lives in a `calls` file next to the script.
    pub fn alternating(first: &Value, second: &Value) -> Self {
        Self::from_body(&format!(
            concat!(
                "count=\"$(dirname \"$0\")/calls\"\n",
                "n=$(cat \"$count\" 2>/dev/null || echo 0)\n",
                "echo $((n + 1)) > \"$count\"\n",
                "if [ $((n % 2)) -eq 0 ]; then\n",
                "  printf '%s\\n' {}\n",
                "else\n",
                "  printf '%s\\n' {}\n",
                "fi"
            ),
            quote(&first.to_string()),
            quote(&second.to_string())
        ))
    }

    /// Stub that forks a `sleep` of `secs`, records its pid in `child.pid`
    /// and waits for it
    pub fn forking(secs: u64) -> Self {
        Self::from_body(&format!(
            "sleep {secs} &\necho $! > \"$(dirname \"$0\")/child.pid\"\nwait"
        ))
    }

    /// Pid written by a [`StubModel::forking`] stub, once it has started
    pub fn child_pid(&self) -> Option<u32> {
        fs::read_to_string(self.dir().join("child.pid"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
    }

    /// Stub answering benign and echoing its argument and environment
    ///
    /// Extra fields: `arg` (first argument), `unbuffered` and `pythonpath`.
    pub fn echo_args() -> Self {
        Self::from_body(concat!(
            r#"printf '{"prediction":2,"tumor_type":"benigno","probability":0.5,"#,
            r#""arg":"%s","unbuffered":"%s","pythonpath":"%s"}\n' "#,
            r#""$1" "$PYTHONUNBUFFERED" "$PYTHONPATH""#
        ))
    }

    /// Path of the script file
    pub fn script_path(&self) -> &Path {
        &self.script
    }

    /// Directory holding the script
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Executable to run the script with
    pub fn interpreter(&self) -> &'static str {
        STUB_INTERPRETER
    }
}

/// Quote `text` as a single shell word
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// A valid request feature array
pub fn sample_features() -> Value {
    json!([5, 1, 1, 1, 2, 1, 3, 1, 1])
}

/// Model output for a malignant classification
pub fn malignant_output() -> Value {
    json!({"prediction": 1, "tumor_type": "maligno", "probability": 0.92})
}

/// Model output for a benign classification
pub fn benign_output() -> Value {
    json!({
        "prediction": 0,
        "tumor_type": "benigno",
        "probability": 0.97,
        "probabilities": {"benigno": 0.97, "maligno": 0.03}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("plain"), "'plain'");
    }

    #[test]
    fn stub_script_written_and_removed() {
        let path = {
            let stub = StubModel::json(&malignant_output());
            let body = fs::read_to_string(stub.script_path()).unwrap();
            assert!(body.starts_with("#!/bin/sh\n"));
            assert!(body.contains(r#""tumor_type":"maligno""#));
            assert_eq!(stub.interpreter(), "sh");
            stub.script_path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn alternating_stub_tracks_calls_beside_script() {
        let stub = StubModel::alternating(&malignant_output(), &benign_output());
        let body = fs::read_to_string(stub.script_path()).unwrap();
        assert!(body.contains("/calls"));
        assert!(body.contains(r#""tumor_type":"maligno""#));
        assert!(body.contains(r#""tumor_type":"benigno""#));
    }

    #[test]
    fn delayed_stub_sleeps_in_seconds() {
        let stub = StubModel::delayed(&malignant_output(), Duration::from_millis(300));
        let body = fs::read_to_string(stub.script_path()).unwrap();
        assert!(body.contains("sleep 0.300\n"));
        assert_eq!(stub.child_pid(), None);
    }
}
