//! Error types for interflow
//!
//! Only construction and configuration problems surface as errors.
//! Degenerate analysis inputs (unresolved calls, missing oracle data,
//! oversized value sets) degrade precision instead of failing the run.

use thiserror::Error;

/// Main error type for interflow operations
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed program view (e.g. a function without an entry instruction)
    #[error("Program error: {0}")]
    Program(String),

    /// A named entry point does not exist in the program view
    #[error("Entry point not found: {0}")]
    EntryPointNotFound(String),
}

impl AnalysisError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AnalysisError::Config(msg.into())
    }

    /// Create a program error
    pub fn program(msg: impl Into<String>) -> Self {
        AnalysisError::Program(msg.into())
    }
}

/// Result type alias for interflow operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::config("bad cap");
        assert_eq!(err.to_string(), "Configuration error: bad cap");

        let err = AnalysisError::EntryPointNotFound("main".to_string());
        assert_eq!(err.to_string(), "Entry point not found: main");
    }
}
