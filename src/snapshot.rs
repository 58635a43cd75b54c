//! Snapshot-file backed Remote Resource API
//!
//! A snapshot is a JSON document holding the remote side's entities, keyed
//! by resource type and then by composite identity:
//!
//! ```json
//! {
//!   "autoscaling_group": {
//!     "web": {
//!       "attributes": {"name": "web", "min_size": 1, "max_size": 3},
//!       "tags": [{"key": "env", "value": "prod", "propagate": true}]
//!     },
//!     "broken": {"error": {"kind": "Throttled", "code": null, "message": "Rate exceeded"}}
//!   }
//! }
//! ```
//!
//! An entry with an `error` field makes every call on that entity fail with
//! the given error, which is how failure paths are exercised offline.
//! Writes happen in memory; [`SnapshotRemote::save`] persists them.

use crate::resource::Registry;
use anyhow::{Context, Result};
use reconcile::tags;
use reconcile::{
    CancelToken, Describe, IdentityCodec, RemoteApi, RemoteError, RemoteErrorKind, RemoteObject,
    RemoteResponse, RemoteResult, RemoteValue, TagDiff, TagSet,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Entry {
    Failure { error: RemoteError },
    Entity(RemoteResponse),
}

type Entities = BTreeMap<String, BTreeMap<String, Entry>>;

pub struct SnapshotRemote {
    entities: Mutex<Entities>,
    codec: IdentityCodec,
    /// Attribute names holding identifier components, per resource type
    identifier_fields: BTreeMap<String, Vec<String>>,
    modified: AtomicBool,
}

impl SnapshotRemote {
    /// Load a snapshot file.
    pub fn load(path: &Path, registry: &Registry) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let remote = Self::from_json(&content, registry)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
        log::debug!("Loaded snapshot from {}", path.display());
        Ok(remote)
    }

    pub fn from_json(content: &str, registry: &Registry) -> Result<Self> {
        let entities: Entities = serde_json::from_str(content)?;
        let identifier_fields = registry
            .iter()
            .map(|d| {
                let fields = d.identifier_fields().iter().map(|f| (*f).to_string()).collect();
                (d.name().to_string(), fields)
            })
            .collect();
        Ok(Self {
            entities: Mutex::new(entities),
            codec: IdentityCodec::default(),
            identifier_fields,
            modified: AtomicBool::new(false),
        })
    }

    /// Whether any write changed the snapshot since it was loaded.
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    /// Write the snapshot back, atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = {
            let entities = self
                .entities
                .lock()
                .map_err(|_| anyhow::anyhow!("Snapshot lock poisoned"))?;
            serde_json::to_string_pretty(&*entities).context("Failed to serialize snapshot")?
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace snapshot: {}", path.display()))?;
        log::debug!("Saved snapshot to {}", path.display());
        Ok(())
    }

    fn lock(&self, cancel: &CancelToken) -> RemoteResult<MutexGuard<'_, Entities>> {
        if cancel.is_cancelled() {
            return Err(RemoteError::cancelled());
        }
        self.entities
            .lock()
            .map_err(|_| RemoteError::new(RemoteErrorKind::Other, "snapshot lock poisoned"))
    }

    fn key(&self, identifiers: &[String]) -> RemoteResult<String> {
        self.codec
            .encode(identifiers)
            .map(|id| id.as_str().to_string())
            .map_err(|e| validation("ValidationException", e.to_string()))
    }

    fn identifiers_from(&self, resource_type: &str, request: &RemoteObject) -> RemoteResult<Vec<String>> {
        let fields = self.identifier_fields.get(resource_type).ok_or_else(|| {
            validation(
                "ValidationException",
                format!("unknown resource type {resource_type}"),
            )
        })?;
        fields
            .iter()
            .map(|field| match request.get(field) {
                Some(RemoteValue::String(s)) => Ok(s.clone()),
                _ => Err(validation(
                    "ValidationException",
                    format!("{field} is required"),
                )),
            })
            .collect()
    }
}

fn validation(code: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorKind::Validation, message).with_code(code)
}

fn not_found(resource_type: &str, key: &str) -> RemoteError {
    RemoteError::new(
        RemoteErrorKind::Other,
        format!("{resource_type} {key} does not exist"),
    )
    .with_code("ResourceNotFoundException")
}

impl RemoteApi for SnapshotRemote {
    fn describe(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe> {
        let key = self.key(identifiers)?;
        let entities = self.lock(cancel)?;
        match entities.get(resource_type).and_then(|m| m.get(&key)) {
            Some(Entry::Entity(response)) => Ok(Describe::Found(response.clone())),
            Some(Entry::Failure { error }) => Err(error.clone()),
            None => Ok(Describe::NotFound),
        }
    }

    fn create(
        &self,
        resource_type: &str,
        request: &RemoteObject,
        cancel: &CancelToken,
    ) -> RemoteResult<Vec<String>> {
        let identifiers = self.identifiers_from(resource_type, request)?;
        let key = self.key(&identifiers)?;
        let mut entities = self.lock(cancel)?;
        let by_id = entities.entry(resource_type.to_string()).or_default();
        if by_id.contains_key(&key) {
            return Err(validation(
                "ResourceInUseException",
                format!("{resource_type} {key} already exists"),
            ));
        }
        by_id.insert(
            key,
            Entry::Entity(RemoteResponse {
                attributes: request.clone(),
                tags: TagSet::new(),
            }),
        );
        self.modified.store(true, Ordering::SeqCst);
        Ok(identifiers)
    }

    fn update(
        &self,
        resource_type: &str,
        identifiers: &[String],
        request: &RemoteObject,
        cancel: &CancelToken,
    ) -> RemoteResult<()> {
        let key = self.key(identifiers)?;
        let mut entities = self.lock(cancel)?;
        match entities.get_mut(resource_type).and_then(|m| m.get_mut(&key)) {
            Some(Entry::Entity(response)) => {
                for (field, value) in request {
                    response.attributes.insert(field.clone(), value.clone());
                }
                self.modified.store(true, Ordering::SeqCst);
                Ok(())
            }
            Some(Entry::Failure { error }) => Err(error.clone()),
            None => Err(not_found(resource_type, &key)),
        }
    }

    fn delete(
        &self,
        resource_type: &str,
        identifiers: &[String],
        cancel: &CancelToken,
    ) -> RemoteResult<Describe> {
        let key = self.key(identifiers)?;
        let mut entities = self.lock(cancel)?;
        let Some(by_id) = entities.get_mut(resource_type) else {
            return Ok(Describe::NotFound);
        };
        if let Some(Entry::Failure { error }) = by_id.get(&key) {
            return Err(error.clone());
        }
        match by_id.remove(&key) {
            Some(Entry::Entity(response)) => {
                self.modified.store(true, Ordering::SeqCst);
                Ok(Describe::Found(response))
            }
            _ => Ok(Describe::NotFound),
        }
    }

    fn update_tags(
        &self,
        resource_type: &str,
        identifiers: &[String],
        changes: &TagDiff,
        cancel: &CancelToken,
    ) -> RemoteResult<()> {
        let key = self.key(identifiers)?;
        let mut entities = self.lock(cancel)?;
        match entities.get_mut(resource_type).and_then(|m| m.get_mut(&key)) {
            Some(Entry::Entity(response)) => {
                response.tags = tags::apply_diff(&response.tags, changes);
                self.modified.store(true, Ordering::SeqCst);
                Ok(())
            }
            Some(Entry::Failure { error }) => Err(error.clone()),
            None => Err(not_found(resource_type, &key)),
        }
    }
}
