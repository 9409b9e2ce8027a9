use std::fmt;

/// Result type for babel-orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the orchestration layer
#[derive(Debug)]
pub enum Error {
    /// Orchestrator or pool has been shut down
    ShutDown,

    /// Configuration rejected at startup
    Config(String),

    /// A task inside a parallel map failed; carries the first error
    TaskFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ShutDown => write!(f, "Orchestrator is shut down"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::TaskFailed(msg) => write!(f, "Task failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
