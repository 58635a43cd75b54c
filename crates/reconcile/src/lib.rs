//! # Reconcile
//!
//! Per-resource state reconciliation between a declared description of a
//! cloud resource and its live state on the remote control plane.
//!
//! ## Core Concepts
//!
//! - **CompositeIdentity**: One opaque local key for a resource addressed by
//!   several remote identifiers ([`IdentityCodec`])
//! - **Digest**: Order-independent content hash of key-value tuples
//!   ([`hash`])
//! - **AttributeTree**: Declared or observed attributes, shaped by a
//!   [`Schema`]; [`bridge`] maps remote payloads to and from trees
//! - **TagSet / IgnorePolicy**: Tag views and tag diffs ([`tags`])
//! - **ResourceReconciler**: Runs one read cycle and publishes a
//!   [`CanonicalStateRecord`] or nothing at all
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{
//!     CancelToken, CompositeIdentity, IgnorePolicy, ResourceReconciler,
//!     RetryConfig, RetryingRemote, TagSet,
//! };
//!
//! let remote = RetryingRemote::new(my_client, RetryConfig::default());
//! let policy = IgnorePolicy::provider_default();
//! let reconciler = ResourceReconciler::new(&remote, &policy);
//!
//! let cycle = reconciler.reconcile(
//!     &MyResourceType,
//!     &CompositeIdentity::from_raw("arn:a,arn:b"),
//!     &TagSet::new().with("env", "prod"),
//!     &CancelToken::new(),
//! );
//! if let Some(record) = cycle.record() {
//!     println!("{} tags: {}", record.identity, record.tags.len());
//! }
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`RemoteApi`]: The cloud control plane (describe/create/update/delete)
//! - [`ResourceType`]: Schema and rules of one kind of resource
//! - [`RetryCallback`]: Receives retry notifications
//! - [`ProgressCallback`]: Receives refresh progress
//!
//! Nothing in this crate reads global state; the ignore policy is always
//! passed in by the caller.

pub mod attribute;
pub mod bridge;
pub mod error;
pub mod executor;
pub mod hash;
pub mod identity;
pub mod reconciler;
pub mod record;
pub mod remote;
pub mod resource;
pub mod retry;
pub mod tags;

// Re-export main types at crate root
pub use attribute::{Attribute, AttributeTree, Element, Kind, Presence, ScalarType, Schema, Value};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{NoProgress, ProgressCallback, Refresh, RefreshSummary, Target, refresh_all};
pub use hash::{Canonical, Digest};
pub use identity::{CompositeIdentity, DEFAULT_SEPARATOR, IdentityCodec};
pub use reconciler::{Cycle, Outcome, Phase, ResourceReconciler};
pub use record::CanonicalStateRecord;
pub use remote::{
    CancelToken, Describe, RemoteApi, RemoteError, RemoteErrorKind, RemoteObject, RemoteResponse,
    RemoteResult, RemoteValue,
};
pub use resource::{BoxedResourceType, ResourceType};
pub use retry::{LogCallback, RetryCallback, RetryConfig, RetryingRemote};
pub use tags::{IgnorePolicy, Tag, TagDiff, TagSet};
