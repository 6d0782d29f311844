#![forbid(unsafe_code)]
//! Shared identifiers and the storage error taxonomy.

use std::fmt;

/// Identifier of a graph vertex as stored in row keys.
///
/// Numeric ids are strictly positive; string ids are non-empty ASCII. The
/// two forms are told apart on disk by the first encoded byte, see
/// [`crate::primitives::bytes::varstring`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum VertexId {
    /// Positive numeric id.
    Numeric(i64),
    /// Custom ASCII string id.
    Text(String),
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexId::Numeric(id) => write!(f, "{id}"),
            VertexId::Text(id) => write!(f, "{id:?}"),
        }
    }
}

impl From<i64> for VertexId {
    fn from(value: i64) -> Self {
        VertexId::Numeric(value)
    }
}

impl From<&str> for VertexId {
    fn from(value: &str) -> Self {
        VertexId::Text(value.to_owned())
    }
}

/// Errors surfaced by stores, store managers and backend adapters.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Non-retriable failure such as a malformed request.
    #[error("permanent backend failure: {message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<Box<StorageError>>,
    },
    /// Retriable failure such as a timeout; retrying is the caller's policy.
    #[error("temporary backend failure: {message}")]
    Temporary {
        message: String,
        #[source]
        source: Option<Box<StorageError>>,
    },
    #[error("interrupted: {0}")]
    Interrupted(&'static str),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    #[error("closed: {0}")]
    Closed(&'static str),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Builds a permanent error without a cause.
    pub fn permanent(message: impl Into<String>) -> Self {
        StorageError::Permanent {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a permanent error wrapping `cause`.
    pub fn permanent_with(message: impl Into<String>, cause: StorageError) -> Self {
        StorageError::Permanent {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Builds a temporary error without a cause.
    pub fn temporary(message: impl Into<String>) -> Self {
        StorageError::Temporary {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for errors a retry policy may retry.
    pub fn is_temporary(&self) -> bool {
        matches!(self, StorageError::Temporary { .. })
    }

    /// Returns true for every error that is not temporary.
    pub fn is_permanent(&self) -> bool {
        !self.is_temporary()
    }

    /// Returns true if this error or any error in its cause chain is an interruption.
    pub fn is_interrupted(&self) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            match err {
                StorageError::Interrupted(_) => return true,
                StorageError::Permanent { source, .. } | StorageError::Temporary { source, .. } => {
                    current = source.as_deref();
                }
                _ => return false,
            }
        }
        false
    }
}
