//! Structured error types shared across VHL crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`LabError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (template names, run ids, paths).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the lab.
///
/// Lookups that find nothing return `Option::None` rather than an error, and
/// a simulator exiting non-zero is recorded in the manifest, so neither has a
/// variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum LabError {
    /// Malformed or missing parameters, unknown templates, unsafe paths.
    #[error("validation error: {0}")]
    Validation(ErrorInfo),
    /// Template rendering failures, including unresolved placeholders.
    #[error("render error: {0}")]
    Render(ErrorInfo),
    /// The external simulator rejected candidate content.
    #[error("simulator rejected content: {0}")]
    Rejected(ErrorInfo),
    /// The external simulator exceeded its wall-clock budget.
    #[error("timeout: {0}")]
    Timeout(ErrorInfo),
    /// Filesystem and process spawning failures.
    #[error("storage error: {0}")]
    Storage(ErrorInfo),
    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl LabError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            LabError::Validation(info)
            | LabError::Render(info)
            | LabError::Rejected(info)
            | LabError::Timeout(info)
            | LabError::Storage(info)
            | LabError::Config(info)
            | LabError::Serde(info) => info,
        }
    }

    /// Wraps an I/O failure for `path` into a [`LabError::Storage`].
    pub fn io(code: &str, path: &std::path::Path, err: impl ToString) -> Self {
        LabError::Storage(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
