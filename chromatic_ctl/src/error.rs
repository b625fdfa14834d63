//! Error types for the chromatic transduction layer.
//!
//! Every fallible operation returns [`CtlResult`]. Variants carry the
//! sequence index and attribute name needed to localise a fault; the
//! computations are pure, so nothing here is ever retried.

use thiserror::Error;

/// Result type alias for transduction operations
pub type CtlResult<T> = Result<T, CtlError>;

/// Error taxonomy shared by the codec, filter, memory and coupling modules.
#[derive(Debug, Error)]
pub enum CtlError {
    /// A configuration key is absent with no applicable default, or holds a
    /// value outside its documented domain.
    #[error("configuration key '{key}' is invalid: {reason}")]
    Configuration { key: String, reason: String },

    /// A component that requires equal-length streams received mismatched lengths.
    #[error("sequence shape mismatch in {context}: expected length {expected}, got {got}")]
    SequenceShape {
        context: String,
        expected: usize,
        got: usize,
    },

    /// An attribute holds a value outside its domain.
    #[error("value out of domain at index {index}: {attribute} = {value}")]
    ValueDomain {
        index: usize,
        attribute: &'static str,
        value: String,
    },

    /// An untyped cell is missing a required attribute or holds the wrong type.
    #[error("malformed cell at index {index}: missing or mistyped attribute '{attribute}'")]
    MalformedCell {
        index: usize,
        attribute: &'static str,
    },

    /// Underlying I/O failure while loading configuration or tables.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML or JSON text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl CtlError {
    pub(crate) fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CtlError::Configuration {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(context: impl Into<String>, expected: usize, got: usize) -> Self {
        CtlError::SequenceShape {
            context: context.into(),
            expected,
            got,
        }
    }
}

impl From<toml::de::Error> for CtlError {
    fn from(err: toml::de::Error) -> Self {
        CtlError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for CtlError {
    fn from(err: serde_json::Error) -> Self {
        CtlError::Parse(err.to_string())
    }
}
