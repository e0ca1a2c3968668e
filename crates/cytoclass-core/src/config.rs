//! Service configuration
//!
//! Built from environment variables through an injectable lookup so tests
//! never touch the process environment.

use crate::error::ConfigError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Runtime environment mode (`NODE_ENV`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        })
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Handling of model probabilities outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbabilityPolicy {
    /// Store whatever the model reported
    #[default]
    PassThrough,
    /// Fail normalization
    Reject,
    /// Clamp into [0, 1]
    Clamp,
}

impl FromStr for ProbabilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" | "pass-through" | "pass_through" => Ok(Self::PassThrough),
            "reject" => Ok(Self::Reject),
            "clamp" => Ok(Self::Clamp),
            other => Err(format!("unknown probability policy `{other}`")),
        }
    }
}

/// Scoring process settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Interpreter or executable launched per request
    pub executable: String,
    /// Scoring script passed as the first positional argument
    pub script_path: PathBuf,
    /// Resource directory exported as `PYTHONPATH`
    pub resource_dir: PathBuf,
    /// Invocation deadline; `None` waits forever
    pub timeout: Option<Duration>,
    /// Concurrent invocation bound; `None` is unbounded
    pub max_concurrency: Option<usize>,
}

impl ModelConfig {
    /// Create config for an executable and script
    #[inline]
    pub fn new(executable: impl Into<String>, script_path: impl Into<PathBuf>) -> Self {
        let script_path = script_path.into();
        let resource_dir = script_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            executable: executable.into(),
            script_path,
            resource_dir,
            timeout: Some(Duration::from_millis(DEFAULT_MODEL_TIMEOUT_MS)),
            max_concurrency: None,
        }
    }

    /// With resource directory
    #[inline]
    #[must_use]
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = dir.into();
        self
    }

    /// With invocation deadline
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// With concurrency bound
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: Option<usize>) -> Self {
        self.max_concurrency = max;
        self
    }
}

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MODEL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_HISTORY_LIMIT: usize = 100;
const DEFAULT_MODEL_PATH: &str = "ml/models/randomForest/model.py";

/// Service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Bind address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Environment mode
    pub environment: Environment,
    /// Log filter directive
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Scoring process settings
    pub model: ModelConfig,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Out-of-range probability handling
    pub probability_policy: ProbabilityPolicy,
    /// History page size
    pub history_limit: usize,
}

impl ServiceConfig {
    /// Create default configuration rooted at the working directory
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment
    ///
    /// # Errors
    /// `ConfigError::Invalid` when a variable is present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    ///
    /// # Errors
    /// `ConfigError::Invalid` when a variable is present but unparseable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let root = PathBuf::from(get("PROJECT_ROOT").unwrap_or_else(|| ".".to_string()));
        let environment: Environment = parse_or(&get, "NODE_ENV", Environment::default())?;
        let default_format = match environment {
            Environment::Production => LogFormat::Json,
            Environment::Development | Environment::Test => LogFormat::Pretty,
        };

        let script_path = root.join(get("MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.into()));
        let resource_dir = get("MODEL_ROOT").map_or_else(|| root.join("ml"), |p| root.join(p));
        let timeout_ms: u64 = parse_or(&get, "MODEL_TIMEOUT_MS", DEFAULT_MODEL_TIMEOUT_MS)?;
        let max_concurrency: usize = parse_or(&get, "MODEL_MAX_CONCURRENCY", 0)?;

        let model = ModelConfig::new(
            get("MODEL_EXECUTABLE").unwrap_or_else(|| "python3".to_string()),
            script_path,
        )
        .with_resource_dir(resource_dir)
        .with_timeout((timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)))
        .with_max_concurrency((max_concurrency > 0).then_some(max_concurrency));

        let history_limit: usize = parse_or(&get, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        if history_limit == 0 {
            return Err(ConfigError::invalid("HISTORY_LIMIT", "0", "must be positive"));
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            environment,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: parse_or(&get, "LOG_FORMAT", default_format)?,
            model,
            database_path: get("DATABASE_PATH")
                .map_or_else(|| root.join("data").join("cytoclass.db"), PathBuf::from),
            probability_policy: parse_or(&get, "PROBABILITY_POLICY", ProbabilityPolicy::default())?,
            history_limit,
        })
    }

    /// With listen port
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// With model settings
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    /// With database file
    #[inline]
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// With probability policy
    #[inline]
    #[must_use]
    pub fn with_probability_policy(mut self, policy: ProbabilityPolicy) -> Self {
        self.probability_policy = policy;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: Environment::Development,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            model: ModelConfig::new("python3", DEFAULT_MODEL_PATH).with_resource_dir("ml"),
            database_path: PathBuf::from("data/cytoclass.db"),
            probability_policy: ProbabilityPolicy::PassThrough,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(key, raw.clone(), e)),
        None => Ok(default),
    }
}
