use std::fmt;

/// Result type for babel-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Core journal/index layer error
    Core(babel_core::Error),

    /// Projection/graph layer error
    Engine(anyhow::Error),

    /// Orchestration layer error
    Orchestrator(babel_orchestrator::Error),

    /// Gather layer error
    Gather(babel_gather::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Workspace not initialized
    NotInitialized(String),

    /// Invalid operation or state
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Core(err) => write!(f, "Core error: {}", err),
            Error::Engine(err) => write!(f, "Engine error: {}", err),
            Error::Orchestrator(err) => write!(f, "Orchestrator error: {}", err),
            Error::Gather(err) => write!(f, "Gather error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::NotInitialized(msg) => write!(f, "Workspace not initialized: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Core(err) => Some(err),
            Error::Engine(err) => Some(err.as_ref()),
            Error::Orchestrator(err) => Some(err),
            Error::Gather(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_) | Error::NotInitialized(_) | Error::InvalidOperation(_) => None,
        }
    }
}

impl From<babel_core::Error> for Error {
    fn from(err: babel_core::Error) -> Self {
        Error::Core(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<babel_orchestrator::Error> for Error {
    fn from(err: babel_orchestrator::Error) -> Self {
        Error::Orchestrator(err)
    }
}

impl From<babel_gather::Error> for Error {
    fn from(err: babel_gather::Error) -> Self {
        Error::Gather(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidOperation(err.to_string())
    }
}
