//! Crate-level errors.
//!
//! The crate uses a two-layer error hierarchy:
//!
//! - [`Error`]: application-facing errors (I/O, configuration, telemetry
//!   setup), used by binaries and demos embedding the engine.
//! - [`EngineError`](crate::engine::EngineError): the coordination taxonomy
//!   (conflicts, lost leases, unavailable collaborators) used inside the
//!   engine and its adapters.
//!
//! [`EngineError`] converts into [`Error`] via `From`, so engine failures
//! propagate cleanly through application code with `?`.

use std::{io, result};

use thiserror::Error as ThisError;

use crate::engine::EngineError;

pub type Result<T> = result::Result<T, Error>;

/// Application-facing errors.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An error in the network or filesystem.
    #[error("IO error: {0:?}")]
    Io(io::ErrorKind),

    /// A coordination-layer failure surfaced to the application.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.kind())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, Error::Io(io::ErrorKind::ConnectionRefused)));
    }

    #[test]
    fn test_engine_error_conversion() {
        let err: Error = EngineError::Shutdown.into();
        assert!(matches!(err, Error::Engine(EngineError::Shutdown)));
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::Config("missing host name".to_string());
        assert!(err.to_string().contains("missing host name"));
    }
}
