//! Error types for bdui
//!
//! One enum per failure domain. Configuration and composition errors abort a
//! run before any scenario executes; driver and step errors fail a single
//! scenario and are reported by the execution engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::driver::expect::SUPPORTED_CONDITIONS;

/// A single schema violation found while validating a config document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted field path, e.g. `webServer.port`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn describe_file(file: &Option<PathBuf>) -> String {
    match file {
        Some(path) => path.display().to_string(),
        None => "<inline config>".to_string(),
    }
}

fn list_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised while discovering, loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration in {}:\n{}", describe_file(.file), list_issues(.issues))]
    Validation {
        file: Option<PathBuf>,
        issues: Vec<ValidationIssue>,
    },

    #[error("Failed to load config file {}: {reason}", .path.display())]
    FileLoad {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cannot resolve project root from {}: {source}", .cwd.display())]
    ProjectRoot {
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn file_load<E>(path: &Path, reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConfigError::FileLoad {
            path: path.to_path_buf(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Every violated field, empty for non-validation errors
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ConfigError::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}

/// Errors raised by [`crate::driver::Driver`] capability calls
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Timeout after {}ms waiting for {what}", .timeout.as_millis())]
    Timeout { what: String, timeout: Duration },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Driver has been destroyed")]
    Destroyed,

    #[error("Unsupported expectation {condition:?}; supported conditions are: {}", SUPPORTED_CONDITIONS.join(", "))]
    UnsupportedCondition { condition: String },

    #[error("Expectation value is not a JSON string: {payload}: {source}")]
    ConditionPayload {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected {selector} {expected}, but found {actual:?}")]
    ExpectationFailed {
        selector: String,
        expected: String,
        actual: String,
    },

    #[error("Browser backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by the per-scenario world
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("World needs either a driver or a driver factory")]
    MissingDriver,

    #[error("Scenario setup failed to navigate to {url}: {source}")]
    Setup {
        url: String,
        #[source]
        source: DriverError,
    },

    #[error("Cached page object is not a {type_name}")]
    PageObject { type_name: &'static str },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Errors returned by step and hook functions
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Builtin steps need a world that exposes WorldRuntime")]
    RuntimeUnavailable,

    #[error("Step argument {index} {reason}")]
    Argument { index: usize, reason: String },

    #[error("Undefined step: {0}")]
    Undefined(String),

    #[error("Step timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    /// Free-form failure for user-defined steps
    pub fn msg(message: impl Into<String>) -> Self {
        StepError::Message(message.into())
    }
}

/// Errors raised while spawning or probing the development web server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Server failed to start: {0}")]
    Startup(String),

    #[error("Server at {url} failed its health check after {attempts} attempts")]
    HealthCheck { url: String, attempts: usize },

    #[error("Server exited before becoming healthy ({0})")]
    Exited(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors that abort a whole run
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid environment variable name {key:?}: names must match [A-Za-z0-9_]+")]
    InvalidEnvKey { key: String },

    #[error("Support extension point unavailable: {0}")]
    ExtensionPointUnavailable(String),

    #[error("Failed to load user support bundle from {builder}: {reason}")]
    SupportLoad { builder: String, reason: String },

    #[error("Invalid step pattern {pattern:?}: {reason}")]
    StepPattern { pattern: String, reason: String },

    #[error("Invalid feature pattern {pattern:?}: {reason}")]
    FeaturePattern { pattern: String, reason: String },

    #[error("Invalid tag expression {expression:?}: {reason}")]
    TagExpression { expression: String, reason: String },

    #[error("Support bundle has no world constructor")]
    MissingWorld,

    #[error("Test run hook failed: {0}")]
    Hook(#[source] StepError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
