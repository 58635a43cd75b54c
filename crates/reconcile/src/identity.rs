//! Composite identities
//!
//! Some remote entities are addressed by more than one identifier (an
//! attachment between a permission set and an instance, for example). The
//! codec packs those identifiers into one opaque string so it can serve as
//! the only local primary key, and unpacks it again without ambiguity.
//!
//! Position is meaningful: the first component is the owning entity, later
//! components are the attached ones. Components are never reordered.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when none is configured.
pub const DEFAULT_SEPARATOR: char = ',';

/// A single opaque local key standing in for one or more remote identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeIdentity(String);

impl CompositeIdentity {
    /// Wrap an identity string read back from persisted state or user input.
    ///
    /// No validation happens here; [`IdentityCodec::decode`] checks the shape.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Packs and unpacks ordered identifier components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityCodec {
    separator: char,
}

impl Default for IdentityCodec {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
        }
    }
}

impl IdentityCodec {
    /// Create a codec with a custom separator.
    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }

    /// The reserved separator character.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Join components into one identity.
    ///
    /// Fails if there are no components, if any component is empty, or if
    /// any component contains the separator (the result would not decode
    /// back to the same components).
    pub fn encode<S: AsRef<str>>(&self, components: &[S]) -> Result<CompositeIdentity> {
        let raw = || {
            components
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(&self.separator.to_string())
        };

        if components.is_empty() {
            return Err(Error::malformed("", "no identifier components"));
        }

        for (position, component) in components.iter().enumerate() {
            let component = component.as_ref();
            if component.is_empty() {
                return Err(Error::malformed(
                    raw(),
                    format!("component {position} is empty"),
                ));
            }
            if component.contains(self.separator) {
                return Err(Error::malformed(
                    raw(),
                    format!(
                        "component {position} ({component:?}) contains the reserved separator {:?}",
                        self.separator
                    ),
                ));
            }
        }

        Ok(CompositeIdentity(raw()))
    }

    /// Split an identity back into exactly `arity` components.
    pub fn decode(&self, id: &CompositeIdentity, arity: usize) -> Result<Vec<String>> {
        let parts: Vec<&str> = id.as_str().split(self.separator).collect();

        if parts.len() != arity {
            return Err(Error::malformed(
                id.as_str(),
                format!(
                    "expected {arity} component(s) separated by {:?}, found {}",
                    self.separator,
                    parts.len()
                ),
            ));
        }

        if let Some(position) = parts.iter().position(|p| p.is_empty()) {
            return Err(Error::malformed(
                id.as_str(),
                format!("component {position} is empty"),
            ));
        }

        Ok(parts.into_iter().map(str::to_string).collect())
    }
}
