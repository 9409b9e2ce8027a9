use std::fmt;

/// Result type for babel-index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the symbol index layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// JSON cache encode/decode failed
    Json(serde_json::Error),

    /// No language configuration registered for this file type
    UnsupportedLanguage(String),

    /// File exceeds the configured per-language size limit
    FileTooLarge { path: String, size: usize },

    /// Two language configs claim the same extension
    ExtensionConflict {
        extension: String,
        existing: String,
        incoming: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::UnsupportedLanguage(ext) => {
                write!(f, "No language config registered for: {}", ext)
            }
            Error::FileTooLarge { path, size } => {
                write!(f, "File too large to index: {} ({} bytes)", path, size)
            }
            Error::ExtensionConflict {
                extension,
                existing,
                incoming,
            } => write!(
                f,
                "Extension {} already registered to {}, cannot register to {}",
                extension, existing, incoming
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
