use std::fmt;

/// Result type for babel-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the core layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// Types layer error
    Types(babel_types::Error),

    /// An event id already exists in a journal with a different payload
    DuplicateEventId(String),

    /// Caller supplied an event whose scope does not match the journal
    ScopeMismatch { expected: String, actual: String },

    /// A journal record before EOF failed to parse
    JournalCorruption { path: String, line: usize },

    /// No `.babel` directory was found
    NotInitialized(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Types(err) => write!(f, "Types error: {}", err),
            Error::DuplicateEventId(id) => {
                write!(f, "Duplicate event id with different payload: {}", id)
            }
            Error::ScopeMismatch { expected, actual } => {
                write!(f, "Scope mismatch: journal is {}, event is {}", expected, actual)
            }
            Error::JournalCorruption { path, line } => {
                write!(f, "Journal corrupt: {} line {}", path, line)
            }
            Error::NotInitialized(msg) => write!(f, "Not initialized: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Types(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<babel_types::Error> for Error {
    fn from(err: babel_types::Error) -> Self {
        Error::Types(err)
    }
}
