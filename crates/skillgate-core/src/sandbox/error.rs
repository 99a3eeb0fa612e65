//! Error types for the sandbox module.

use crate::domain::Language;

/// Errors produced while running a code sample.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("interpreter not found: {program}")]
    InterpreterMissing { program: String },

    #[error("execution timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("no runner for language: {language}")]
    Unsupported { language: Language },

    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
