//! Error types for cytoclass core
//!
//! One error family per pipeline stage:
//! - Feature validation (client input malformed)
//! - Model invocation (process unavailable, failed, hung, or emitted garbage)
//! - Result normalization (model output missing or mistyped fields)
//! - Persistence (store unreachable or write failed)

use std::fmt;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Feature vector rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Model process failed
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// Model output could not be normalized
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// Store operation failed
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    /// Classify the error by originating stage
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Invocation(_) => ErrorKind::Invocation,
            Self::Normalization(_) => ErrorKind::Normalization,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Check if the caller is at fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Diagnostic detail suitable for a response body
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::Invocation(InvocationError::ModelProcessFailed { stderr, .. }) => stderr.clone(),
            Self::Invocation(InvocationError::MalformedOutput { raw, .. }) => raw.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// Error classification, one per pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input rejected before invocation
    Validation,
    /// External process failure
    Invocation,
    /// Output shape failure
    Normalization,
    /// Store failure
    Persistence,
}

impl ErrorKind {
    /// Stable lowercase name, used in logs
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Invocation => "invocation",
            ErrorKind::Normalization => "normalization",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature vector validation errors
///
/// Only the first violation (by ascending index) is reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Input is not an array
    #[error("features must be an array")]
    NotASequence,

    /// Array has the wrong number of elements
    #[error("exactly {expected} features are required, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// Element is not a number
    #[error("feature {attribute} (index {index}) must be a number")]
    NotNumeric { index: usize, attribute: &'static str },

    /// Element lies outside the closed range
    #[error("feature {attribute} (index {index}) must be between {min} and {max}")]
    OutOfRange {
        index: usize,
        attribute: &'static str,
        min: f64,
        max: f64,
    },
}

/// Model invocation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// Executable missing or not launchable
    #[error("model runtime unavailable: {executable}: {reason}")]
    RuntimeUnavailable { executable: String, reason: String },

    /// Process exited with a nonzero status
    #[error("model process failed with exit code {}: {stderr}", display_code(.exit_code))]
    ModelProcessFailed {
        /// `None` when the process was terminated by a signal
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Process succeeded but stdout is not a JSON object
    #[error("model output is not a JSON object: {reason}")]
    MalformedOutput { raw: String, reason: String },

    /// Deadline elapsed; the process was killed
    #[error("model process timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Stream capture failed mid-flight
    #[error("model process I/O failed: {0}")]
    Io(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (signal)".to_string(), |c| c.to_string())
}

/// Normalization errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    /// Required field absent
    #[error("model output is missing required field `{0}`")]
    MissingField(&'static str),

    /// Field present with the wrong type or an unknown value
    #[error("model output field `{name}` is invalid: {reason}")]
    InvalidField { name: &'static str, reason: String },

    /// Probability outside [0, 1] under the reject policy
    #[error("model probability {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f64),
}

/// Persistence gateway errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Store could not be reached (connection, worker thread)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Statement failed
    #[error("store query failed: {0}")]
    Query(String),

    /// Stored row could not be decoded
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Variable present but unparseable
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Create invalid-value error
    #[inline]
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::OutOfRange {
            index: 2,
            attribute: "Uniformity_of_Cell_Shape",
            min: 1.0,
            max: 10.0,
        };
        assert_eq!(
            err.to_string(),
            "feature Uniformity_of_Cell_Shape (index 2) must be between 1 and 10"
        );
    }

    #[test]
    fn pipeline_error_classification() {
        let err = PipelineError::from(ValidationError::NotASequence);
        assert!(err.is_client_error());
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = PipelineError::from(InvocationError::Timeout { elapsed_ms: 10 });
        assert!(!err.is_client_error());
        assert_eq!(err.kind(), ErrorKind::Invocation);

        let err = PipelineError::from(PersistenceError::Query("locked".into()));
        assert_eq!(err.kind().to_string(), "persistence");
    }

    #[test]
    fn details_surface_raw_diagnostics() {
        let err = PipelineError::from(InvocationError::ModelProcessFailed {
            exit_code: Some(1),
            stderr: "Traceback".to_string(),
        });
        assert_eq!(err.details(), "Traceback");

        let err = PipelineError::from(InvocationError::MalformedOutput {
            raw: "not json".to_string(),
            reason: "expected value".to_string(),
        });
        assert_eq!(err.details(), "not json");

        let err = PipelineError::from(NormalizationError::MissingField("probability"));
        assert!(err.details().contains("probability"));
    }

    #[test]
    fn signal_exit_display() {
        let err = InvocationError::ModelProcessFailed {
            exit_code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }
}
