//! Attribute bridge between remote payloads and attribute trees
//!
//! `flatten` turns a remote payload into an [`AttributeTree`] and `expand`
//! turns a tree back into a remote request. Both walk the declared
//! [`Schema`], so shape checks happen here once and nowhere else.
//!
//! Mapping rules on read:
//! - an absent (or null) scalar becomes [`Value::Unset`], never a zero value
//! - an absent list, set or singleton block becomes an empty sequence
//! - a present singleton block becomes a one-element list
//! - list elements keep their order; set elements are normalized by digest
//! - remote fields the schema does not declare are dropped
//!
//! On write only `Required` and `Optional` attributes are emitted; `Computed`
//! ones are dropped at every nesting level.

use crate::attribute::{Attribute, AttributeTree, Element, Kind, Presence, ScalarType, Schema, Value};
use crate::error::{Error, Result};
use crate::remote::{RemoteObject, RemoteValue};
use std::collections::BTreeMap;

/// Build an attribute tree from a remote payload.
pub fn flatten(schema: &Schema, remote: &RemoteObject) -> Result<AttributeTree> {
    flatten_block(schema, remote, "").map(AttributeTree::from_block)
}

/// Build a remote request from an attribute tree.
pub fn expand(schema: &Schema, tree: &AttributeTree) -> Result<RemoteObject> {
    let mut values = BTreeMap::new();
    for (name, value) in tree.iter() {
        values.insert(name.to_string(), value.clone());
    }
    expand_block(schema, &values, "")
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

// ============================================================================
// Flatten
// ============================================================================

fn flatten_block(
    schema: &Schema,
    remote: &RemoteObject,
    prefix: &str,
) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (name, attribute) in schema.iter() {
        let path = join(prefix, name);
        let field = match remote.get(name) {
            None | Some(RemoteValue::Null) => None,
            Some(v) => Some(v),
        };
        let value = flatten_attribute(&attribute.kind, field, &path)?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

fn flatten_attribute(kind: &Kind, field: Option<&RemoteValue>, path: &str) -> Result<Value> {
    match kind {
        Kind::Scalar(ty) => match field {
            None => Ok(Value::Unset),
            Some(v) => flatten_scalar(*ty, v, path),
        },
        Kind::List(element) => {
            let items = flatten_sequence(element, field, path)?;
            Ok(Value::List(items))
        }
        Kind::Set(element) => {
            let items = flatten_sequence(element, field, path)?;
            Ok(Value::set_from(items))
        }
        Kind::Single(block) => match field {
            None => Ok(Value::List(Vec::new())),
            Some(RemoteValue::Object(obj)) => {
                let fields = flatten_block(block, obj, &join(path, "0"))?;
                Ok(Value::List(vec![Value::Block(fields)]))
            }
            Some(other) => Err(Error::shape(path, "object", other.shape_name())),
        },
    }
}

fn flatten_sequence(
    element: &Element,
    field: Option<&RemoteValue>,
    path: &str,
) -> Result<Vec<Value>> {
    let items = match field {
        None => return Ok(Vec::new()),
        Some(RemoteValue::Seq(items)) => items,
        Some(other) => return Err(Error::shape(path, "sequence", other.shape_name())),
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let item_path = join(path, &index.to_string());
            match (element, item) {
                (Element::Scalar(ty), v) => flatten_scalar(*ty, v, &item_path),
                (Element::Block(block), RemoteValue::Object(obj)) => {
                    flatten_block(block, obj, &item_path).map(Value::Block)
                }
                (Element::Block(_), other) => {
                    Err(Error::shape(item_path, "object", other.shape_name()))
                }
            }
        })
        .collect()
}

fn flatten_scalar(ty: ScalarType, value: &RemoteValue, path: &str) -> Result<Value> {
    match (ty, value) {
        (ScalarType::Bool, RemoteValue::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarType::Int, RemoteValue::Int(i)) => Ok(Value::Int(*i)),
        (ScalarType::String, RemoteValue::String(s)) => Ok(Value::String(s.clone())),
        (ty, other) => Err(Error::shape(path, ty.to_string(), other.shape_name())),
    }
}

// ============================================================================
// Expand
// ============================================================================

fn expand_block(
    schema: &Schema,
    values: &BTreeMap<String, Value>,
    prefix: &str,
) -> Result<RemoteObject> {
    let mut out = RemoteObject::new();
    for (name, attribute) in schema.iter() {
        if attribute.presence == Presence::Computed {
            continue;
        }
        let path = join(prefix, name);
        let value = values.get(name).unwrap_or(&Value::Unset);
        if let Some(remote) = expand_attribute(attribute, value, &path)? {
            out.insert(name.to_string(), remote);
        }
    }
    Ok(out)
}

/// Returns `None` when the attribute should be omitted from the request.
fn expand_attribute(attribute: &Attribute, value: &Value, path: &str) -> Result<Option<RemoteValue>> {
    let expanded = match (&attribute.kind, value) {
        (_, Value::Unset) => None,
        (Kind::Scalar(ty), v) => Some(expand_scalar(*ty, v, path)?),
        (Kind::List(element), Value::List(items)) | (Kind::Set(element), Value::Set(items)) => {
            if items.is_empty() {
                None
            } else {
                Some(RemoteValue::Seq(expand_sequence(element, items, path)?))
            }
        }
        (Kind::Set(element), Value::List(items)) => {
            // Trees built from configuration may carry sets as plain lists.
            let normalized = Value::set_from(items.iter().cloned());
            if normalized.elements().is_empty() {
                None
            } else {
                Some(RemoteValue::Seq(expand_sequence(
                    element,
                    normalized.elements(),
                    path,
                )?))
            }
        }
        (Kind::Single(block), Value::List(items)) => match items.as_slice() {
            [] => None,
            [Value::Block(fields)] => Some(RemoteValue::Object(expand_block(
                block,
                fields,
                &join(path, "0"),
            )?)),
            [other] => {
                return Err(Error::shape(join(path, "0"), "block", other.shape_name()));
            }
            _ => {
                return Err(Error::shape(
                    path,
                    "at most one block",
                    format!("{} blocks", items.len()),
                ));
            }
        },
        (Kind::List(_) | Kind::Set(_), other) => {
            return Err(Error::shape(path, "sequence", other.shape_name()));
        }
        (Kind::Single(_), other) => {
            return Err(Error::shape(path, "list of one block", other.shape_name()));
        }
    };

    if expanded.is_none() && attribute.presence == Presence::Required {
        return Err(Error::MissingRequired {
            path: path.to_string(),
        });
    }
    Ok(expanded)
}

fn expand_sequence(element: &Element, items: &[Value], path: &str) -> Result<Vec<RemoteValue>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let item_path = join(path, &index.to_string());
            match (element, item) {
                (Element::Scalar(ty), v) => expand_scalar(*ty, v, &item_path),
                (Element::Block(block), Value::Block(fields)) => {
                    expand_block(block, fields, &item_path).map(RemoteValue::Object)
                }
                (Element::Block(_), other) => {
                    Err(Error::shape(item_path, "block", other.shape_name()))
                }
            }
        })
        .collect()
}

fn expand_scalar(ty: ScalarType, value: &Value, path: &str) -> Result<RemoteValue> {
    match (ty, value) {
        (ScalarType::Bool, Value::Bool(b)) => Ok(RemoteValue::Bool(*b)),
        (ScalarType::Int, Value::Int(i)) => Ok(RemoteValue::Int(*i)),
        (ScalarType::String, Value::String(s)) => Ok(RemoteValue::String(s.clone())),
        (ty, other) => Err(Error::shape(path, ty.to_string(), other.shape_name())),
    }
}
