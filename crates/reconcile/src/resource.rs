//! Resource type descriptors
//!
//! A [`ResourceType`] tells the reconciler what a kind of remote entity
//! looks like: its attribute schema, how many identifiers address it, and
//! whether it carries tags. Per-type business rules stay in the descriptor;
//! the reconciler itself is generic.

use crate::attribute::{AttributeTree, Schema};
use crate::error::Result;
use std::fmt;

/// Core trait for resource type descriptors
///
/// # Example
///
/// ```ignore
/// use reconcile::{Attribute, ResourceType, Schema};
///
/// #[derive(Debug)]
/// struct Bucket;
///
/// impl ResourceType for Bucket {
///     fn name(&self) -> &'static str {
///         "s3_bucket"
///     }
///
///     fn description(&self) -> &'static str {
///         "Object storage bucket"
///     }
///
///     fn schema(&self) -> Schema {
///         Schema::new()
///             .attribute("bucket", Attribute::required_string())
///             .attribute("arn", Attribute::computed_string())
///     }
/// }
/// ```
pub trait ResourceType: Send + Sync + fmt::Debug {
    /// Type name used by the remote API and in configuration
    /// (e.g. "dynamodb_table")
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Declared attribute schema
    fn schema(&self) -> Schema;

    /// Number of remote identifiers packed into the composite identity
    ///
    /// Position matters: for a two-part identity the first component is
    /// the owning entity and the second the attached one.
    fn identity_arity(&self) -> usize {
        1
    }

    /// Whether the remote entity carries tags
    fn supports_tags(&self) -> bool {
        true
    }

    /// Local pre-flight check run before any write
    ///
    /// Rejections here never reach the remote side.
    fn validate(&self, _tree: &AttributeTree) -> Result<()> {
        Ok(())
    }
}

/// A boxed descriptor for type-erased registries
pub type BoxedResourceType = Box<dyn ResourceType>;
