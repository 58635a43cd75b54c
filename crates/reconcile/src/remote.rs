//! Remote Resource API boundary
//!
//! The [`RemoteApi`] trait abstracts the cloud control plane, allowing for
//! different implementations (a real SDK client, a snapshot file, an
//! in-memory mock for tests). Transport details stop at this boundary: the
//! reconciler only ever sees `Found | NotFound | RemoteError`.

use crate::tags::{TagDiff, TagSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A value in a remote payload.
///
/// Each variant is an explicit shape; the attribute bridge validates
/// payloads against the declared schema once, at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Fractional numbers; no schema scalar maps to them
    Float(f64),
    String(String),
    Seq(Vec<RemoteValue>),
    Object(RemoteObject),
}

impl RemoteValue {
    /// Short name of the shape, used in error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Object(_) => "object",
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }
}

/// A structured remote payload: field name to value.
pub type RemoteObject = BTreeMap<String, RemoteValue>;

/// What a successful describe returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub attributes: RemoteObject,
    #[serde(default)]
    pub tags: TagSet,
}

/// Outcome of a describe call.
#[derive(Debug, Clone, PartialEq)]
pub enum Describe {
    Found(RemoteResponse),
    NotFound,
}

/// Classification of remote errors, decided by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// Request rate exceeded
    Throttled,
    /// Transient or eventual-consistency failure
    Transient,
    /// The remote side rejected the request as invalid
    Validation,
    /// The call was aborted by cancellation
    Cancelled,
    /// Anything else
    Other,
}

impl RemoteErrorKind {
    /// Whether this kind is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Transient)
    }
}

/// Error reported by the Remote Resource API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// Service error code (e.g. `ValidationException`)
    pub code: Option<String>,
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn cancelled() -> Self {
        Self::new(RemoteErrorKind::Cancelled, "operation cancelled")
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Result type for Remote Resource API calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Cooperative cancellation shared between a caller and in-flight calls.
///
/// Fires either when [`CancelToken::cancel`] is called or when the optional
/// deadline passes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that fires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Remote Resource API collaborator.
///
/// Implementations are expected to be retry-safe already (see
/// [`crate::retry::RetryingRemote`]) and to abort when the token fires.
pub trait RemoteApi: Send + Sync {
    /// Read the live state of the entity addressed by `identifiers`.
    fn describe(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe>;

    /// Read an entity that was just created and may not be visible yet.
    fn describe_new(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe> {
        self.describe(resource_type, identifiers, cancel)
    }

    /// Create an entity, returning its identifier components in order.
    fn create(
        &self,
        resource_type: &str,
        request: &RemoteObject,
        cancel: &CancelToken,
    ) -> RemoteResult<Vec<String>>;

    /// Update an existing entity in place.
    fn update(
        &self,
        resource_type: &str,
        identifiers: &[String],
        request: &RemoteObject,
        cancel: &CancelToken,
    ) -> RemoteResult<()>;

    /// Delete an entity. Implementations report an absent entity as `Ok(Describe::NotFound)`.
    fn delete(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe>;

    /// Push tag changes.
    fn update_tags(
        &self,
        resource_type: &str,
        identifiers: &[String],
        changes: &TagDiff,
        cancel: &CancelToken,
    ) -> RemoteResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_value_from_json() {
        let json = r#"{"name": "t", "count": 3, "enabled": true, "gone": null,
                       "zones": ["a", "b"], "block": {"k": "v"}}"#;
        let obj: RemoteObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj["name"], RemoteValue::string("t"));
        assert_eq!(obj["count"], RemoteValue::Int(3));
        assert_eq!(obj["enabled"], RemoteValue::Bool(true));
        assert_eq!(obj["gone"], RemoteValue::Null);
        assert_eq!(obj["zones"].shape_name(), "sequence");
        assert_eq!(obj["block"].shape_name(), "object");
    }

    #[test]
    fn test_fractional_number_parses_as_float() {
        let obj: RemoteObject = serde_json::from_str(r#"{"ratio": 0.5, "count": 2}"#).unwrap();
        assert_eq!(obj["ratio"], RemoteValue::Float(0.5));
        assert_eq!(obj["ratio"].shape_name(), "float");
        assert_eq!(obj["count"], RemoteValue::Int(2));
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::new(
            RemoteErrorKind::Validation,
            "Only ManagedPolicyArn or CustomerManagedPolicyReference should be given.",
        )
        .with_code("ValidationException");
        assert_eq!(
            err.to_string(),
            "ValidationException: Only ManagedPolicyArn or CustomerManagedPolicyReference should be given."
        );
        assert!(!err.is_retryable());
        assert!(RemoteError::new(RemoteErrorKind::Throttled, "slow down").is_retryable());
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
        assert!(token.remaining().is_none());
    }

    #[test]
    fn test_cancel_token_deadline() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
        assert_eq!(token.remaining(), Some(Duration::ZERO));
    }
}
