use std::io;

use thiserror::Error;

/// Errors produced while indexing, training, persisting or decoding.
#[derive(Debug, Error)]
pub enum Error {
    /// A training or decoding parameter is out of range.
    #[error("{name} {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// What the value must satisfy
        reason: &'static str,
    },

    /// A string-keyed parameter name is not recognized.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// A string-keyed parameter value could not be parsed.
    #[error("invalid value {value:?} for parameter {name}")]
    InvalidParameterValue {
        /// Parameter name
        name: String,
        /// The raw value that failed to parse
        value: String,
    },

    /// An event could not be indexed.
    #[error("malformed event #{index}: {reason}")]
    MalformedEvent {
        /// Position of the event in the input stream
        index: usize,
        /// Why the event was rejected
        reason: String,
    },

    /// Nothing left to train on.
    #[error("no training data")]
    NoTrainingData,

    /// No outcome was valid for any candidate at some position.
    #[error("no valid outcome sequence could be extended at position {position}")]
    DecodeInfeasible {
        /// Input position at which the beam became empty
        position: usize,
    },

    /// A persisted model is unreadable or has an unsupported version.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type alias for maxent operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_model<S: Into<String>>(msg: S) -> Self {
        Error::InvalidModel(msg.into())
    }

    pub(crate) fn malformed<S: Into<String>>(index: usize, reason: S) -> Self {
        Error::MalformedEvent {
            index,
            reason: reason.into(),
        }
    }
}
