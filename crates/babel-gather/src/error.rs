use std::fmt;

use crate::safety::SafetyViolation;

/// Result type for babel-gather operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the gather layer.
///
/// Per-source failures are not errors: they render inline in the
/// corpus so partial results stay useful. Only plan-level problems
/// surface here.
#[derive(Debug)]
pub enum Error {
    /// A bash source was rejected by the safety gate
    Safety(SafetyViolation),

    /// The orchestrator refused the work (shut down)
    Orchestrator(babel_orchestrator::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Safety(violation) => f.write_str(&violation.message),
            Error::Orchestrator(err) => write!(f, "Orchestrator error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Safety(violation) => Some(violation),
            Error::Orchestrator(err) => Some(err),
        }
    }
}

impl From<SafetyViolation> for Error {
    fn from(violation: SafetyViolation) -> Self {
        Error::Safety(violation)
    }
}

impl From<babel_orchestrator::Error> for Error {
    fn from(err: babel_orchestrator::Error) -> Self {
        Error::Orchestrator(err)
    }
}
