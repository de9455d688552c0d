//! Structured error types shared across the entropy profiling crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`EntError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (SOC index, plateau, sizes, etc.).
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
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the entropy profiling pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum EntError {
    /// No usable SOC boundaries in the log.
    #[error("segmentation error: {0}")]
    Segmentation(ErrorInfo),
    /// Too few plateau markers or samples for the configured analysis.
    #[error("insufficient data: {0}")]
    InsufficientData(ErrorInfo),
    /// A nonlinear solver exhausted its evaluation budget or went non-finite.
    #[error("fit divergence: {0}")]
    FitDivergence(ErrorInfo),
    /// Too few datapoints relative to the model parameter count.
    #[error("degenerate fit: {0}")]
    DegenerateFit(ErrorInfo),
    /// Catalog, channel mapping or column layout errors.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// File system errors.
    #[error("io error: {0}")]
    Io(ErrorInfo),
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

impl EntError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            EntError::Segmentation(info)
            | EntError::InsufficientData(info)
            | EntError::FitDivergence(info)
            | EntError::DegenerateFit(info)
            | EntError::Config(info)
            | EntError::Io(info)
            | EntError::Serde(info) => info,
        }
    }

    /// Short family label used in logs and reports.
    pub fn family(&self) -> &'static str {
        match self {
            EntError::Segmentation(_) => "segmentation",
            EntError::InsufficientData(_) => "insufficient-data",
            EntError::FitDivergence(_) => "fit-divergence",
            EntError::DegenerateFit(_) => "degenerate-fit",
            EntError::Config(_) => "config",
            EntError::Io(_) => "io",
            EntError::Serde(_) => "serde",
        }
    }

    /// Adds a context entry to the wrapped payload.
    pub fn with_context(self, key: impl Into<String>, value: impl ToString) -> Self {
        match self {
            EntError::Segmentation(info) => EntError::Segmentation(info.with_context(key, value)),
            EntError::InsufficientData(info) => {
                EntError::InsufficientData(info.with_context(key, value))
            }
            EntError::FitDivergence(info) => EntError::FitDivergence(info.with_context(key, value)),
            EntError::DegenerateFit(info) => EntError::DegenerateFit(info.with_context(key, value)),
            EntError::Config(info) => EntError::Config(info.with_context(key, value)),
            EntError::Io(info) => EntError::Io(info.with_context(key, value)),
            EntError::Serde(info) => EntError::Serde(info.with_context(key, value)),
        }
    }

    /// Sets the remediation hint of the wrapped payload.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            EntError::Segmentation(info) => EntError::Segmentation(info.with_hint(hint)),
            EntError::InsufficientData(info) => EntError::InsufficientData(info.with_hint(hint)),
            EntError::FitDivergence(info) => EntError::FitDivergence(info.with_hint(hint)),
            EntError::DegenerateFit(info) => EntError::DegenerateFit(info.with_hint(hint)),
            EntError::Config(info) => EntError::Config(info.with_hint(hint)),
            EntError::Io(info) => EntError::Io(info.with_hint(hint)),
            EntError::Serde(info) => EntError::Serde(info.with_hint(hint)),
        }
    }
}
