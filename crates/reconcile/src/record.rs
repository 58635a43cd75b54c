//! Canonical state record
//!
//! The published result of a successful read cycle. Records are immutable
//! values: a later cycle replaces the whole record, it never patches one.

use crate::attribute::AttributeTree;
use crate::hash::{self, Digest};
use crate::identity::CompositeIdentity;
use crate::tags::TagSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalStateRecord {
    pub identity: CompositeIdentity,
    pub resource_type: String,
    pub attributes: AttributeTree,
    /// Tags after the ignore policy was applied
    pub tags: TagSet,
}

impl CanonicalStateRecord {
    pub fn new(
        identity: CompositeIdentity,
        resource_type: impl Into<String>,
        attributes: AttributeTree,
        tags: TagSet,
    ) -> Self {
        Self {
            identity,
            resource_type: resource_type.into(),
            attributes,
            tags,
        }
    }

    /// Digest over attributes and tags, for cheap drift checks between cycles.
    pub fn digest(&self) -> Digest {
        let attributes = hash::digest(
            self.attributes
                .iter()
                .filter(|(_, v)| !v.is_unset())
                .map(|(k, v)| (k, hash::Canonical::canonical_form(v))),
        );
        hash::digest([
            ("attributes", attributes.to_hex()),
            ("tags", self.tags.digest().to_hex()),
        ])
    }
}
