use std::error::Error as StdError;
use std::fmt;

/// Error type covering every failure the classifier surfaces to callers.
///
/// All variants are raised synchronously by the offending call; nothing is
/// logged-and-continued. A failed `fit` leaves the classifier unfitted.
#[derive(Debug)]
pub enum Error {
    /// Bad configuration: unknown loss name, loss/encoding mismatch,
    /// unrecognized persisted model kind.
    Config(String),
    /// Bad training or prediction data: row-count mismatch, malformed
    /// one-hot rows, too few classes, label/oracle shape incompatibility.
    Validation(String),
    /// Fitted-only surface accessed while the classifier is unfitted.
    State(String),
    /// Failure propagated unmodified from an optimizer backend.
    Optimizer(String),
    /// File-level failure while saving or loading an envelope.
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Validation(msg) => write!(f, "validation error: {msg}"),
            Error::State(msg) => write!(f, "state error: {msg}"),
            Error::Optimizer(msg) => write!(f, "optimizer failure: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
