//! Error types for reconciliation.
//!
//! Errors are categorized so callers can tell data and schema mistakes
//! (never retried) apart from remote failures. `NotFound` is deliberately
//! absent: a missing remote entity is a cycle outcome, not an error.

use crate::remote::RemoteError;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Identity or configuration data violates an invariant
    Data,
    /// Remote payload or attribute tree disagrees with the declared schema
    Schema,
    /// The remote side failed
    Remote,
    /// The operation was cancelled or timed out
    Cancelled,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Data => "Invalid identity or configuration",
            Self::Schema => "Schema mismatch",
            Self::Remote => "Remote API failure",
            Self::Cancelled => "Operation cancelled",
        }
    }
}

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Composite identity violates arity or separator invariants
    #[error("malformed identity {raw:?}: {reason}")]
    MalformedIdentity {
        /// The identity string, or the joined raw components when encoding failed
        raw: String,
        /// What was wrong with it
        reason: String,
    },

    /// Remote payload or tree shape disagrees with the declared schema
    #[error("unmappable shape at {path}: expected {expected}, found {found}")]
    UnmappableShape {
        /// Dotted attribute path (e.g. `permissions_boundary.0.name`)
        path: String,
        /// Shape the schema declares
        expected: String,
        /// Shape that was actually present
        found: String,
    },

    /// A `Required` leaf was absent when building a remote request
    #[error("required attribute {path} is not set")]
    MissingRequired {
        /// Dotted attribute path
        path: String,
    },

    /// Local pre-flight validation rejected the declared configuration
    #[error("invalid {resource_type} configuration: {message}")]
    InvalidConfig {
        /// Resource type name
        resource_type: String,
        /// What was wrong
        message: String,
    },

    /// An ignore pattern could not be compiled
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The pattern as written in configuration
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// The remote API returned an error other than not-found
    #[error("{operation} {identity}: {source}")]
    RemoteFailure {
        /// Composite identity (or raw components) of the resource
        identity: String,
        /// Failing operation name
        operation: &'static str,
        /// Error as reported by the remote API
        #[source]
        source: RemoteError,
    },

    /// The cycle was cancelled before completing
    #[error("{operation} {identity}: cancelled")]
    Cancelled {
        /// Composite identity (or raw components) of the resource
        identity: String,
        /// Operation in flight when cancellation fired
        operation: &'static str,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MalformedIdentity { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidPattern { .. } => ErrorCategory::Data,
            Error::UnmappableShape { .. } | Error::MissingRequired { .. } => ErrorCategory::Schema,
            Error::RemoteFailure { .. } => ErrorCategory::Remote,
            Error::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only remote errors the collaborator classified as transient qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RemoteFailure { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn malformed(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedIdentity {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Error::UnmappableShape {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
