use std::io;

use thiserror::Error;

/// Errors produced while building, training, storing or scoring a CRF model
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid model shape or training parameter
    #[error("{0}")]
    Config(String),
    /// Malformed or truncated model file
    #[error("model format error at line {line}: {message}")]
    Format { line: usize, message: String },
    /// Feature or tag identifier outside the model, or a belief table whose
    /// shape does not match the sequence it was computed for
    #[error("{0}")]
    Index(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn format<S: Into<String>>(line: usize, message: S) -> Self {
        Error::Format {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn index<S: Into<String>>(message: S) -> Self {
        Error::Index(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
