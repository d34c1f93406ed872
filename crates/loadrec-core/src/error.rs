use std::path::PathBuf;

use thiserror::Error;

/// Canonical error type for recording operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The recording pipeline could not be built (file, channel or thread).
    #[error("cannot set up recorder for `{}`: {message}", path.display())]
    Setup {
        /// Output file the pipeline was being built for.
        path: PathBuf,
        /// Human-readable cause.
        message: String,
        /// Underlying I/O failure, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Flushing or closing the output stream failed during stop.
    #[error("cannot shut down recorder for `{}`: {message}", path.display())]
    Shutdown {
        /// Output file that was being closed.
        path: PathBuf,
        /// Human-readable cause.
        message: String,
        /// Underlying I/O failure, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Operation violates current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Validation error for input data.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl CoreError {
    /// Creates a `Setup` variant without an I/O source.
    #[must_use]
    pub fn setup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Setup {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `Setup` variant wrapping an I/O failure.
    #[must_use]
    pub fn setup_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Setup {
            path: path.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a `Shutdown` variant without an I/O source.
    #[must_use]
    pub fn shutdown(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Shutdown {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `Shutdown` variant wrapping an I/O failure.
    #[must_use]
    pub fn shutdown_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Shutdown {
            path: path.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::SerializationError(err.to_string())
        } else {
            Self::DeserializationError(err.to_string())
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_mentions_path() {
        let err = CoreError::setup_io(
            "/nonexistent/values.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/nonexistent/values.txt"));
        assert!(msg.contains("no such directory"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_json_read_errors_map_to_deserialization() {
        for input in ["1 x", "", "{"] {
            let err: CoreError = serde_json::from_str::<u32>(input).unwrap_err().into();
            assert!(
                matches!(err, CoreError::DeserializationError(_)),
                "`{input}` mapped to {err:?}"
            );
        }
    }

    #[test]
    fn test_json_write_failure_maps_to_serialization() {
        struct Broken;

        impl std::io::Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err: CoreError = serde_json::to_writer(Broken, &[1, 2, 3]).unwrap_err().into();
        assert!(matches!(err, CoreError::SerializationError(_)));
    }
}
