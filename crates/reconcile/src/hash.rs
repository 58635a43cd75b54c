//! Content hashing for set-valued attributes
//!
//! Set elements get a stable identity from their content rather than from
//! their position. Every element is rendered into a canonical string form,
//! the forms are sorted lexicographically, concatenated and hashed with
//! BLAKE3. The digest therefore depends only on the set's contents and is
//! reproducible across processes.
//!
//! Canonical form of a key-value pair is `{key}-{value}-`. A tag adds its
//! propagate flag: `{key}-{value}-{flag}-`. Field text is escaped (`\` as
//! `\\`, `-` as `\-`) so that `("a-b", "c")` and `("a", "b-c")` render
//! differently.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Fixed-size content digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parse a 64-character hex rendering.
    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex).ok().map(|h| Self(*h.as_bytes()))
    }

    /// Short prefix for display.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Digest::from_hex(&hex).ok_or_else(|| serde::de::Error::custom("invalid digest hex"))
    }
}

/// Something with a canonical string form used for content hashing.
pub trait Canonical {
    /// Render the canonical form. Equal values must render identically.
    fn canonical_form(&self) -> String;
}

/// Escape one field for inclusion in a canonical form.
pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if c == '\\' || c == '-' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Canonical form of a single key-value pair: `{key}-{value}-`.
pub fn pair_form(key: &str, value: &str) -> String {
    format!("{}-{}-", escape_field(key), escape_field(value))
}

/// Hash already-rendered canonical forms, ignoring their order.
pub fn digest_forms<I>(forms: I) -> Digest
where
    I: IntoIterator<Item = String>,
{
    let mut forms: Vec<String> = forms.into_iter().collect();
    forms.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for form in &forms {
        hasher.update(form.as_bytes());
    }
    Digest(*hasher.finalize().as_bytes())
}

/// Order-independent digest of a set of key-value pairs.
pub fn digest<I, K, V>(pairs: I) -> Digest
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    digest_forms(
        pairs
            .into_iter()
            .map(|(k, v)| pair_form(k.as_ref(), v.as_ref())),
    )
}

/// Order-independent digest of a collection of canonical items.
pub fn digest_items<'a, T, I>(items: I) -> Digest
where
    T: Canonical + 'a,
    I: IntoIterator<Item = &'a T>,
{
    digest_forms(items.into_iter().map(Canonical::canonical_form))
}
