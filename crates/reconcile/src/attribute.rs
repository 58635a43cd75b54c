//! Attribute schemas and attribute trees
//!
//! A [`Schema`] declares the shape of a resource: which attributes exist,
//! their kind, and whether they are `Required`, `Optional` or `Computed`.
//! An [`AttributeTree`] holds values conforming to a schema.
//!
//! Nested blocks that may be present or absent (`Single`) are stored as a
//! sequence of zero or one blocks, never as a bare optional struct, so both
//! states are representable without ambiguity.

use crate::hash::{self, Canonical, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Who supplies an attribute's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Must be declared locally before any write
    Required,
    /// May be declared locally
    Optional,
    /// Assigned by the remote side; never sent on writes
    Computed,
}

/// Scalar leaf types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int,
    String,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::String => f.write_str("string"),
        }
    }
}

/// Element type of a list or set.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Scalar(ScalarType),
    Block(Schema),
}

/// Shape of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    /// A single scalar value
    Scalar(ScalarType),
    /// Ordered sequence; element order is preserved
    List(Element),
    /// Unordered set; elements are keyed by content digest
    Set(Element),
    /// Nested block that is either present once or absent
    Single(Schema),
}

/// One declared attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: Kind,
    pub presence: Presence,
}

impl Attribute {
    pub fn new(kind: Kind, presence: Presence) -> Self {
        Self { kind, presence }
    }

    pub fn required(kind: Kind) -> Self {
        Self::new(kind, Presence::Required)
    }

    pub fn optional(kind: Kind) -> Self {
        Self::new(kind, Presence::Optional)
    }

    pub fn computed(kind: Kind) -> Self {
        Self::new(kind, Presence::Computed)
    }

    pub fn required_string() -> Self {
        Self::required(Kind::Scalar(ScalarType::String))
    }

    pub fn optional_string() -> Self {
        Self::optional(Kind::Scalar(ScalarType::String))
    }

    pub fn computed_string() -> Self {
        Self::computed(Kind::Scalar(ScalarType::String))
    }

    pub fn is_computed(&self) -> bool {
        self.presence == Presence::Computed
    }
}

/// Attribute declarations for a resource or nested block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute declaration.
    pub fn attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Declared attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A value in an attribute tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Not set. Distinct from any zero value.
    Unset,
    Bool(bool),
    Int(i64),
    String(String),
    /// Ordered sequence
    List(Vec<Value>),
    /// Unordered set, stored sorted by element digest with duplicates removed
    Set(Vec<Value>),
    /// Nested block
    Block(BTreeMap<String, Value>),
}

impl Value {
    /// Build a set, normalizing element order by content digest.
    pub fn set_from<I: IntoIterator<Item = Value>>(elements: I) -> Self {
        let mut keyed: BTreeMap<Digest, Value> = BTreeMap::new();
        for element in elements {
            keyed.entry(element.digest()).or_insert(element);
        }
        Value::Set(keyed.into_values().collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    /// Short name of the value's shape, used in error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Block(_) => "block",
        }
    }

    /// Content digest of this value.
    pub fn digest(&self) -> Digest {
        hash::digest_forms([self.canonical_form()])
    }

    /// Elements of a list or set, or an empty slice for anything else.
    pub fn elements(&self) -> &[Value] {
        match self {
            Value::List(items) | Value::Set(items) => items,
            _ => &[],
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Block(fields) => Some(fields),
            _ => None,
        }
    }
}

impl Canonical for Value {
    fn canonical_form(&self) -> String {
        match self {
            Value::Unset => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::String(s) => hash::escape_field(s),
            Value::List(items) => {
                let forms: Vec<String> = items.iter().map(Canonical::canonical_form).collect();
                format!("[{}]", forms.join("-"))
            }
            Value::Set(items) => format!("{{{}}}", hash::digest_items(items).to_hex()),
            Value::Block(fields) => hash::digest(
                fields
                    .iter()
                    .filter(|(_, v)| !v.is_unset())
                    .map(|(k, v)| (k.as_str(), v.canonical_form())),
            )
            .to_hex(),
        }
    }
}

/// Root of a resource's attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeTree {
    values: BTreeMap<String, Value>,
}

impl AttributeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_block(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Value of a top-level attribute; absent names read as [`Value::Unset`].
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&Value::Unset)
    }

    /// Follow a dotted path such as `permissions_boundary.0.managed_policy_arn`.
    pub fn lookup(&self, path: &str) -> &Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return &Value::Unset;
        };
        let mut current = self.get(first);
        for segment in segments {
            current = match (current, segment.parse::<usize>()) {
                (Value::List(items) | Value::Set(items), Ok(index)) => {
                    items.get(index).unwrap_or(&Value::Unset)
                }
                (Value::Block(fields), _) => fields.get(segment).unwrap_or(&Value::Unset),
                _ => &Value::Unset,
            };
        }
        current
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_block(self) -> BTreeMap<String, Value> {
        self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
