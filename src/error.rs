//! Step errors
//!
//! Every way a step can end without passing is a [`StepError`]. The engine
//! maps each kind onto an example status (`pending` or `failed`) and decides
//! whether the scenario stalls.

use std::path::PathBuf;

/// Message used when a step declares itself pending without a reason.
pub const NO_REASON_GIVEN: &str = "No reason given";

/// Message recorded for a step that no definition matches.
pub const STEP_DOES_NOT_EXIST: &str = "step does not exist";

/// The kind of step error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No step definition matches the description
    Undefined,
    /// More than one step definition matches the description
    Ambiguous,
    /// The step body declared itself pending
    PendingDeclared,
    /// The step body failed (returned an error or panicked)
    StepFailed,
    /// Not attempted: an earlier step in the scenario is pending
    DependencyPending,
    /// Not attempted: an earlier step in the scenario failed
    DependencyFailed,
    /// A before/after hook failed
    HookFailed,
}

impl ErrorKind {
    /// Whether an error of this kind is reported as `pending` rather than `failed`
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            ErrorKind::Undefined
                | ErrorKind::PendingDeclared
                | ErrorKind::DependencyPending
                | ErrorKind::DependencyFailed
        )
    }

    /// Whether the step was skipped because of an earlier stall
    pub fn is_dependency(self) -> bool {
        matches!(self, ErrorKind::DependencyPending | ErrorKind::DependencyFailed)
    }
}

/// A step error with the step's trace
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    /// Backtrace-like trace lines; the invoking step's caller is appended
    /// by the engine so failures point at the feature-file line.
    pub backtrace: Vec<String>,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StepFailed, message)
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PendingDeclared, message)
    }

    pub fn undefined(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Undefined, description)
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ambiguous, message)
    }

    pub fn with_trace(mut self, line: impl Into<String>) -> Self {
        self.backtrace.push(line.into());
        self
    }

    pub fn is_pending(&self) -> bool {
        self.kind.is_pending()
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self::failed(message)
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::failed(message)
    }
}

/// Result type returned by step bodies
pub type StepResult = Result<(), StepError>;

/// Declare the calling step pending without a reason.
pub fn pending() -> StepResult {
    Err(StepError::pending(NO_REASON_GIVEN))
}

/// Declare the calling step pending with a reason.
pub fn pending_with(reason: impl Into<String>) -> StepResult {
    Err(StepError::pending(reason))
}

/// Errors raised while loading feature trees
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("feature directory not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse feature tree {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
