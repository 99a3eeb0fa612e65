//! Sandbox: isolated, time-bounded execution of code samples.
//!
//! # Modules
//!
//! - [`execution`]: `SandboxConfig`, `CodeRunner`, `ProcessRunner`
//! - [`classify`]: `ErrorClassifier` rule table over interpreter output
//! - [`error`]: `SandboxError` / `SandboxResult`

pub mod classify;
pub mod error;
pub mod execution;

pub use classify::{ClassifierRule, ErrorClassifier, FailureKind};
pub use error::{SandboxError, SandboxResult};
pub use execution::{
    truncate_chars, CodeRunner, ExecutionOutcome, ProcessRunner, RunMode, SandboxConfig,
};
