//! Error types for the analysis pipeline

use std::fmt;

/// Errors that can occur during an analysis run
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Invalid configuration or input shape (raised before any work starts)
    InvalidInput(String),

    /// The caller's cancellation predicate returned true; no partial result exists
    Cancelled,

    /// Accelerator dispatch failed (only surfaced when `strict_gpu` is set)
    GpuError(String),

    /// Processing error during analysis
    ProcessingError(String),

    /// Numerical error (non-finite values, overflow, etc.)
    NumericalError(String),
}

impl AnalysisError {
    /// True when the run was aborted by cooperative cancellation.
    ///
    /// Callers treat this as "no result" rather than a failure worth logging loudly.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AnalysisError::Cancelled => write!(f, "Analysis cancelled"),
            AnalysisError::GpuError(msg) => write!(f, "GPU error: {}", msg),
            AnalysisError::ProcessingError(msg) => write!(f, "Processing error: {}", msg),
            AnalysisError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}
