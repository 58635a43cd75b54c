//! Per-resource reconciliation cycles
//!
//! A read cycle walks `Start -> Fetched -> Bridged -> Reconciled` and ends
//! in exactly one of `Committed`, `NotFound` or `Failed`. Nothing is
//! published before `Committed`; a failure at any step discards whatever
//! was built so far.
//!
//! The reconciler never retries. The [`RemoteApi`] it is given is expected
//! to be retry-safe already (see [`crate::retry::RetryingRemote`]).

use crate::attribute::AttributeTree;
use crate::bridge;
use crate::error::{Error, Result};
use crate::identity::{CompositeIdentity, IdentityCodec};
use crate::record::CanonicalStateRecord;
use crate::remote::{
    CancelToken, Describe, RemoteApi, RemoteError, RemoteErrorKind, RemoteObject,
};
use crate::resource::ResourceType;
use crate::tags::{self, IgnorePolicy, TagSet};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Cycle state
// ============================================================================

/// States of a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Fetched,
    Bridged,
    Reconciled,
    Committed,
    NotFound,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::NotFound | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Fetched => "fetched",
            Self::Bridged => "bridged",
            Self::Reconciled => "reconciled",
            Self::Committed => "committed",
            Self::NotFound => "not found",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of a cycle.
#[derive(Debug)]
pub enum Outcome {
    /// A fresh record replacing any previous one
    Committed(CanonicalStateRecord),
    /// The remote entity is confirmed absent; its record must be destroyed
    NotFound { identity: CompositeIdentity },
    /// The cycle aborted; the previous record, if any, stays as it was
    Failed(Error),
}

impl Outcome {
    /// Apply this outcome to a set of records keyed by identity.
    ///
    /// Returns `true` when the set changed.
    pub fn apply_to(
        &self,
        records: &mut BTreeMap<CompositeIdentity, CanonicalStateRecord>,
    ) -> bool {
        match self {
            Outcome::Committed(record) => {
                let previous = records.insert(record.identity.clone(), record.clone());
                previous.as_ref() != Some(record)
            }
            Outcome::NotFound { identity } => records.remove(identity).is_some(),
            Outcome::Failed(_) => false,
        }
    }
}

/// One completed cycle: the phases it went through and how it ended.
#[derive(Debug)]
pub struct Cycle {
    /// Composite identity, or the raw components when none could be built
    pub identity: String,
    pub phases: Vec<Phase>,
    pub outcome: Outcome,
}

impl Cycle {
    /// The terminal phase.
    pub fn phase(&self) -> Phase {
        match self.outcome {
            Outcome::Committed(_) => Phase::Committed,
            Outcome::NotFound { .. } => Phase::NotFound,
            Outcome::Failed(_) => Phase::Failed,
        }
    }

    pub fn record(&self) -> Option<&CanonicalStateRecord> {
        match &self.outcome {
            Outcome::Committed(record) => Some(record),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Records phase transitions and logs them.
struct Tracker {
    identity: String,
    phases: Vec<Phase>,
}

impl Tracker {
    fn start(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        log::debug!("{identity}: {}", Phase::Start);
        Self {
            identity,
            phases: vec![Phase::Start],
        }
    }

    fn advance(&mut self, phase: Phase) {
        let from = self.phases.last().copied().unwrap_or(Phase::Start);
        log::debug!("{}: {from} -> {phase}", self.identity);
        self.phases.push(phase);
    }

    fn finish(mut self, outcome: Outcome) -> Cycle {
        let phase = match &outcome {
            Outcome::Committed(_) => Phase::Committed,
            Outcome::NotFound { .. } => Phase::NotFound,
            Outcome::Failed(e) => {
                log::warn!("{}: cycle failed: {e}", self.identity);
                Phase::Failed
            }
        };
        self.advance(phase);
        Cycle {
            identity: self.identity,
            phases: self.phases,
            outcome,
        }
    }

    fn fail(self, error: Error) -> Cycle {
        self.finish(Outcome::Failed(error))
    }
}

fn remote_error(identity: &str, operation: &'static str, source: RemoteError) -> Error {
    if source.kind == RemoteErrorKind::Cancelled {
        Error::Cancelled {
            identity: identity.to_string(),
            operation,
        }
    } else {
        Error::RemoteFailure {
            identity: identity.to_string(),
            operation,
            source,
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Which describe call a read cycle uses.
#[derive(Clone, Copy)]
enum Read {
    Existing,
    JustWritten,
}

/// Orchestrates reconciliation cycles against one Remote Resource API.
///
/// Holds only shared references; cycles on different resources can run on
/// separate threads with the same reconciler.
pub struct ResourceReconciler<'a, R: RemoteApi + ?Sized> {
    remote: &'a R,
    policy: &'a IgnorePolicy,
    codec: IdentityCodec,
}

impl<'a, R: RemoteApi + ?Sized> ResourceReconciler<'a, R> {
    pub fn new(remote: &'a R, policy: &'a IgnorePolicy) -> Self {
        Self {
            remote,
            policy,
            codec: IdentityCodec::default(),
        }
    }

    /// Use a non-default identity codec.
    pub fn with_codec(mut self, codec: IdentityCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> &IdentityCodec {
        &self.codec
    }

    pub fn policy(&self) -> &IgnorePolicy {
        self.policy
    }

    /// Run a read cycle for an existing entity.
    pub fn reconcile(
        &self,
        kind: &dyn ResourceType,
        identity: &CompositeIdentity,
        local_tags: &TagSet,
        cancel: &CancelToken,
    ) -> Cycle {
        let tracker = Tracker::start(identity.as_str());
        let identifiers = match self.codec.decode(identity, kind.identity_arity()) {
            Ok(ids) => ids,
            Err(e) => return tracker.fail(e),
        };
        self.read(kind, identity, &identifiers, local_tags, cancel, Read::Existing, tracker)
    }

    /// Create a new entity from a declared tree and read it back.
    pub fn create(
        &self,
        kind: &dyn ResourceType,
        tree: &AttributeTree,
        local_tags: &TagSet,
        cancel: &CancelToken,
    ) -> Cycle {
        let mut tracker = Tracker::start(format!("new {}", kind.name()));
        let request = match self.prepare(kind, tree, &tracker.identity) {
            Ok(request) => request,
            Err(e) => return tracker.fail(e),
        };

        let identifiers = match self.remote.create(kind.name(), &request, cancel) {
            Ok(ids) => ids,
            Err(e) => {
                let err = remote_error(&tracker.identity, "create", e);
                return tracker.fail(err);
            }
        };
        if identifiers.len() != kind.identity_arity() {
            let raw = identifiers.join(" ");
            return tracker.fail(Error::malformed(
                raw,
                format!(
                    "remote returned {} identifiers, {} expects {}",
                    identifiers.len(),
                    kind.name(),
                    kind.identity_arity()
                ),
            ));
        }
        let identity = match self.codec.encode(identifiers.as_slice()) {
            Ok(identity) => identity,
            Err(e) => return tracker.fail(e),
        };
        log::info!("created {} {identity}", kind.name());
        tracker.identity = identity.to_string();

        if kind.supports_tags() {
            let changes = tags::diff(local_tags, &TagSet::new(), self.policy);
            if !changes.is_empty()
                && let Err(e) = self
                    .remote
                    .update_tags(kind.name(), &identifiers, &changes, cancel)
            {
                log::warn!("{identity} exists remotely but has no state record yet");
                let err = remote_error(&tracker.identity, "update_tags", e);
                return tracker.fail(err);
            }
        }

        let cycle =
            self.read(kind, &identity, &identifiers, local_tags, cancel, Read::JustWritten, tracker);
        if cycle.phase() != Phase::Committed {
            log::warn!("{identity} exists remotely but has no state record yet");
        }
        cycle
    }

    /// Update an existing entity in place, push tag changes, then re-read.
    pub fn update(
        &self,
        kind: &dyn ResourceType,
        identity: &CompositeIdentity,
        tree: &AttributeTree,
        local_tags: &TagSet,
        cancel: &CancelToken,
    ) -> Cycle {
        let tracker = Tracker::start(identity.as_str());
        let identifiers = match self.codec.decode(identity, kind.identity_arity()) {
            Ok(ids) => ids,
            Err(e) => return tracker.fail(e),
        };
        let request = match self.prepare(kind, tree, identity.as_str()) {
            Ok(request) => request,
            Err(e) => return tracker.fail(e),
        };

        let current = match self.remote.describe(kind.name(), &identifiers, cancel) {
            Ok(Describe::Found(response)) => response,
            Ok(Describe::NotFound) => {
                return tracker.finish(Outcome::NotFound {
                    identity: identity.clone(),
                });
            }
            Err(e) => return tracker.fail(remote_error(identity.as_str(), "describe", e)),
        };

        if let Err(e) = self
            .remote
            .update(kind.name(), &identifiers, &request, cancel)
        {
            return tracker.fail(remote_error(identity.as_str(), "update", e));
        }

        if kind.supports_tags() {
            let changes = tags::diff(local_tags, &current.tags, self.policy);
            if !changes.is_empty() {
                log::info!("{identity}: pushing {} tag change(s)", changes.total());
                if let Err(e) = self
                    .remote
                    .update_tags(kind.name(), &identifiers, &changes, cancel)
                {
                    return tracker.fail(remote_error(identity.as_str(), "update_tags", e));
                }
            }
        }

        self.read(kind, identity, &identifiers, local_tags, cancel, Read::Existing, tracker)
    }

    /// Delete an entity. An entity that is already gone counts as deleted.
    pub fn delete(
        &self,
        kind: &dyn ResourceType,
        identity: &CompositeIdentity,
        cancel: &CancelToken,
    ) -> Cycle {
        let tracker = Tracker::start(identity.as_str());
        let identifiers = match self.codec.decode(identity, kind.identity_arity()) {
            Ok(ids) => ids,
            Err(e) => return tracker.fail(e),
        };
        match self.remote.delete(kind.name(), &identifiers, cancel) {
            Ok(found) => {
                if found == Describe::NotFound {
                    log::debug!("{identity}: already absent");
                }
                tracker.finish(Outcome::NotFound {
                    identity: identity.clone(),
                })
            }
            Err(e) => tracker.fail(remote_error(identity.as_str(), "delete", e)),
        }
    }

    /// Validate and expand a declared tree into a request.
    fn prepare(
        &self,
        kind: &dyn ResourceType,
        tree: &AttributeTree,
        identity: &str,
    ) -> Result<RemoteObject> {
        kind.validate(tree)?;
        bridge::expand(&kind.schema(), tree).inspect_err(|e| {
            log::debug!("{identity}: expand failed: {e}");
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &self,
        kind: &dyn ResourceType,
        identity: &CompositeIdentity,
        identifiers: &[String],
        local_tags: &TagSet,
        cancel: &CancelToken,
        read: Read,
        mut tracker: Tracker,
    ) -> Cycle {
        if cancel.is_cancelled() {
            return tracker.fail(Error::Cancelled {
                identity: identity.to_string(),
                operation: "describe",
            });
        }

        let described = match read {
            Read::Existing => self.remote.describe(kind.name(), identifiers, cancel),
            Read::JustWritten => self.remote.describe_new(kind.name(), identifiers, cancel),
        };
        let response = match described {
            Ok(Describe::Found(response)) => response,
            Ok(Describe::NotFound) => {
                return tracker.finish(Outcome::NotFound {
                    identity: identity.clone(),
                });
            }
            Err(e) => return tracker.fail(remote_error(identity.as_str(), "describe", e)),
        };
        tracker.advance(Phase::Fetched);

        let attributes = match bridge::flatten(&kind.schema(), &response.attributes) {
            Ok(tree) => tree,
            Err(e) => return tracker.fail(e),
        };
        tracker.advance(Phase::Bridged);

        let visible = if kind.supports_tags() {
            tags::view(local_tags, &response.tags, self.policy)
        } else {
            TagSet::new()
        };
        tracker.advance(Phase::Reconciled);

        // A cancellation that fired mid-cycle discards everything built so far.
        if cancel.is_cancelled() {
            return tracker.fail(Error::Cancelled {
                identity: identity.to_string(),
                operation: "describe",
            });
        }

        tracker.finish(Outcome::Committed(CanonicalStateRecord::new(
            identity.clone(),
            kind.name(),
            attributes,
            visible,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, Kind, Schema, Value};
    use crate::remote::{RemoteResponse, RemoteResult, RemoteValue};
    use crate::tags::{Tag, TagDiff};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Attachment;

    impl ResourceType for Attachment {
        fn name(&self) -> &'static str {
            "attachment"
        }

        fn description(&self) -> &'static str {
            "Two-part attachment"
        }

        fn schema(&self) -> Schema {
            Schema::new()
                .attribute("owner", Attribute::required_string())
                .attribute("target", Attribute::required_string())
                .attribute("arn", Attribute::computed_string())
                .attribute(
                    "options",
                    Attribute::optional(Kind::Single(
                        Schema::new().attribute("mode", Attribute::optional_string()),
                    )),
                )
        }

        fn identity_arity(&self) -> usize {
            2
        }
    }

    /// In-memory remote keyed by joined identifiers.
    #[derive(Default)]
    struct Memory {
        entities: Mutex<BTreeMap<Vec<String>, RemoteResponse>>,
        fail_with: Option<RemoteErrorKind>,
        fail_tags: bool,
        requests: Mutex<Vec<RemoteObject>>,
    }

    impl Memory {
        fn with_entity(self, ids: &[&str], response: RemoteResponse) -> Self {
            self.entities
                .lock()
                .unwrap()
                .insert(ids.iter().map(|s| (*s).to_string()).collect(), response);
            self
        }

        fn failing(kind: RemoteErrorKind) -> Self {
            Self {
                fail_with: Some(kind),
                ..Default::default()
            }
        }

        fn check(&self) -> RemoteResult<()> {
            match self.fail_with {
                Some(kind) => Err(RemoteError::new(kind, "injected").with_code("TestException")),
                None => Ok(()),
            }
        }
    }

    impl RemoteApi for Memory {
        fn describe(&self, _: &str, ids: &[String], _: &CancelToken) -> RemoteResult<Describe> {
            self.check()?;
            Ok(match self.entities.lock().unwrap().get(ids) {
                Some(response) => Describe::Found(response.clone()),
                None => Describe::NotFound,
            })
        }

        fn create(&self, _: &str, request: &RemoteObject, _: &CancelToken) -> RemoteResult<Vec<String>> {
            self.check()?;
            self.requests.lock().unwrap().push(request.clone());
            let id = |field: &str| match request.get(field) {
                Some(RemoteValue::String(s)) => s.clone(),
                _ => String::new(),
            };
            let ids = vec![id("owner"), id("target")];
            let mut attributes = request.clone();
            attributes.insert("arn".to_string(), RemoteValue::string("arn:generated"));
            self.entities.lock().unwrap().insert(
                ids.clone(),
                RemoteResponse {
                    attributes,
                    tags: TagSet::new().with("aws:created", "yes"),
                },
            );
            Ok(ids)
        }

        fn update(&self, _: &str, ids: &[String], request: &RemoteObject, _: &CancelToken) -> RemoteResult<()> {
            self.check()?;
            self.requests.lock().unwrap().push(request.clone());
            if let Some(entity) = self.entities.lock().unwrap().get_mut(ids) {
                for (k, v) in request {
                    entity.attributes.insert(k.clone(), v.clone());
                }
            }
            Ok(())
        }

        fn delete(&self, _: &str, ids: &[String], _: &CancelToken) -> RemoteResult<Describe> {
            self.check()?;
            Ok(match self.entities.lock().unwrap().remove(ids) {
                Some(response) => Describe::Found(response),
                None => Describe::NotFound,
            })
        }

        fn update_tags(&self, _: &str, ids: &[String], changes: &TagDiff, _: &CancelToken) -> RemoteResult<()> {
            self.check()?;
            if self.fail_tags {
                return Err(RemoteError::new(RemoteErrorKind::Other, "tagging denied"));
            }
            if let Some(entity) = self.entities.lock().unwrap().get_mut(ids) {
                entity.tags = tags::apply_diff(&entity.tags, changes);
            }
            Ok(())
        }
    }

    fn attributes(json: &str) -> RemoteObject {
        serde_json::from_str(json).unwrap()
    }

    fn identity() -> CompositeIdentity {
        CompositeIdentity::from_raw("arn:a,arn:b")
    }

    fn existing() -> Memory {
        Memory::default().with_entity(
            &["arn:a", "arn:b"],
            RemoteResponse {
                attributes: attributes(r#"{"owner": "arn:a", "target": "arn:b", "arn": "arn:x"}"#),
                tags: TagSet::new()
                    .with("env", "staging")
                    .with("aws:autoscaling:groupName", "x"),
            },
        )
    }

    #[test]
    fn test_read_cycle_commits() {
        let remote = existing();
        let policy = IgnorePolicy::provider_default();
        let reconciler = ResourceReconciler::new(&remote, &policy);

        let cycle = reconciler.reconcile(
            &Attachment,
            &identity(),
            &TagSet::new().with("env", "prod"),
            &CancelToken::new(),
        );

        assert_eq!(
            cycle.phases,
            vec![
                Phase::Start,
                Phase::Fetched,
                Phase::Bridged,
                Phase::Reconciled,
                Phase::Committed
            ]
        );
        let record = cycle.record().unwrap();
        assert_eq!(record.identity, identity());
        assert_eq!(record.tags, TagSet::new().with("env", "staging"));
        assert_eq!(record.attributes.get("options"), &Value::List(vec![]));
        assert_eq!(record.attributes.get("arn").as_str(), Some("arn:x"));
    }

    #[test]
    fn test_scenario_not_found_destroys_record() {
        let remote = existing();
        let policy = IgnorePolicy::provider_default();
        let reconciler = ResourceReconciler::new(&remote, &policy);
        let mut records = BTreeMap::new();

        let first = reconciler.reconcile(&Attachment, &identity(), &TagSet::new(), &CancelToken::new());
        assert!(first.outcome.apply_to(&mut records));
        assert!(records.contains_key(&identity()));

        remote.entities.lock().unwrap().clear();
        let second = reconciler.reconcile(&Attachment, &identity(), &TagSet::new(), &CancelToken::new());
        assert_eq!(second.phase(), Phase::NotFound);
        assert_eq!(second.phases, vec![Phase::Start, Phase::NotFound]);
        assert!(second.outcome.apply_to(&mut records));
        assert!(records.is_empty());
    }

    #[test]
    fn test_failed_cycle_keeps_previous_record() {
        let remote = existing();
        let policy = IgnorePolicy::none();
        let mut records = BTreeMap::new();
        ResourceReconciler::new(&remote, &policy)
            .reconcile(&Attachment, &identity(), &TagSet::new(), &CancelToken::new())
            .outcome
            .apply_to(&mut records);

        let broken = Memory::failing(RemoteErrorKind::Other);
        let cycle = ResourceReconciler::new(&broken, &policy).reconcile(
            &Attachment,
            &identity(),
            &TagSet::new(),
            &CancelToken::new(),
        );
        assert_eq!(cycle.phase(), Phase::Failed);
        assert!(!cycle.outcome.apply_to(&mut records));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_remote_failure_carries_identity_and_operation() {
        let remote = Memory::failing(RemoteErrorKind::Validation);
        let policy = IgnorePolicy::none();
        let cycle = ResourceReconciler::new(&remote, &policy).reconcile(
            &Attachment,
            &identity(),
            &TagSet::new(),
            &CancelToken::new(),
        );
        match cycle.error() {
            Some(Error::RemoteFailure {
                identity,
                operation,
                source,
            }) => {
                assert_eq!(identity, "arn:a,arn:b");
                assert_eq!(*operation, "describe");
                assert_eq!(source.code.as_deref(), Some("TestException"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_identity_fails_before_remote_call() {
        let remote = Memory::failing(RemoteErrorKind::Other);
        let policy = IgnorePolicy::none();
        let cycle = ResourceReconciler::new(&remote, &policy).reconcile(
            &Attachment,
            &CompositeIdentity::from_raw("arn:a"),
            &TagSet::new(),
            &CancelToken::new(),
        );
        assert!(matches!(cycle.error(), Some(Error::MalformedIdentity { .. })));
        assert_eq!(cycle.phases, vec![Phase::Start, Phase::Failed]);
    }

    #[test]
    fn test_unmappable_payload_fails_cycle() {
        let remote = Memory::default().with_entity(
            &["arn:a", "arn:b"],
            RemoteResponse {
                attributes: attributes(r#"{"options": "flat"}"#),
                tags: TagSet::new(),
            },
        );
        let policy = IgnorePolicy::none();
        let cycle = ResourceReconciler::new(&remote, &policy).reconcile(
            &Attachment,
            &identity(),
            &TagSet::new(),
            &CancelToken::new(),
        );
        assert!(matches!(cycle.error(), Some(Error::UnmappableShape { .. })));
        assert_eq!(cycle.phases, vec![Phase::Start, Phase::Fetched, Phase::Failed]);
    }

    #[test]
    fn test_cancelled_cycle_publishes_nothing() {
        let remote = existing();
        let policy = IgnorePolicy::none();
        let token = CancelToken::new();
        token.cancel();
        let cycle = ResourceReconciler::new(&remote, &policy).reconcile(
            &Attachment,
            &identity(),
            &TagSet::new(),
            &token,
        );
        assert!(matches!(cycle.error(), Some(Error::Cancelled { .. })));
        assert!(cycle.record().is_none());
    }

    #[test]
    fn test_create_drops_computed_and_reads_back() {
        let remote = Memory::default();
        let policy = IgnorePolicy::provider_default();
        let tree = AttributeTree::new()
            .with("owner", Value::string("arn:a"))
            .with("target", Value::string("arn:b"))
            .with("arn", Value::string("arn:ignored"));
        let mut local = TagSet::new().with("env", "prod");
        local.insert(Tag::new("aws:reserved", "mine"));

        let cycle = ResourceReconciler::new(&remote, &policy).create(
            &Attachment,
            &tree,
            &local,
            &CancelToken::new(),
        );

        let record = cycle.record().unwrap();
        assert_eq!(record.identity.as_str(), "arn:a,arn:b");
        assert_eq!(record.tags, TagSet::new().with("env", "prod"));
        assert_eq!(record.attributes.get("arn").as_str(), Some("arn:generated"));
        let requests = remote.requests.lock().unwrap();
        assert!(!requests[0].contains_key("arn"));
    }

    #[test]
    fn test_create_failure_names_pending_entity() {
        let remote = Memory::failing(RemoteErrorKind::Validation);
        let policy = IgnorePolicy::none();
        let tree = AttributeTree::new()
            .with("owner", Value::string("arn:a"))
            .with("target", Value::string("arn:b"));
        let cycle = ResourceReconciler::new(&remote, &policy).create(
            &Attachment,
            &tree,
            &TagSet::new(),
            &CancelToken::new(),
        );
        match cycle.error() {
            Some(Error::RemoteFailure {
                identity,
                operation,
                ..
            }) => {
                assert_eq!(identity, "new attachment");
                assert_eq!(*operation, "create");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_create_tag_failure_leaves_entity_without_record() {
        let remote = Memory {
            fail_tags: true,
            ..Default::default()
        };
        let policy = IgnorePolicy::none();
        let tree = AttributeTree::new()
            .with("owner", Value::string("arn:a"))
            .with("target", Value::string("arn:b"));
        let cycle = ResourceReconciler::new(&remote, &policy).create(
            &Attachment,
            &tree,
            &TagSet::new().with("env", "prod"),
            &CancelToken::new(),
        );

        match cycle.error() {
            Some(Error::RemoteFailure {
                identity,
                operation,
                ..
            }) => {
                assert_eq!(identity, "arn:a,arn:b");
                assert_eq!(*operation, "update_tags");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(cycle.record().is_none());
        assert_eq!(remote.entities.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_create_missing_required_never_calls_remote() {
        let remote = Memory::default();
        let policy = IgnorePolicy::none();
        let tree = AttributeTree::new().with("owner", Value::string("arn:a"));
        let cycle = ResourceReconciler::new(&remote, &policy).create(
            &Attachment,
            &tree,
            &TagSet::new(),
            &CancelToken::new(),
        );
        assert!(matches!(cycle.error(), Some(Error::MissingRequired { .. })));
        assert!(remote.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_pushes_tag_diff() {
        let remote = existing();
        let policy = IgnorePolicy::provider_default();
        let tree = AttributeTree::new()
            .with("owner", Value::string("arn:a"))
            .with("target", Value::string("arn:b"));

        let cycle = ResourceReconciler::new(&remote, &policy).update(
            &Attachment,
            &identity(),
            &tree,
            &TagSet::new().with("env", "prod"),
            &CancelToken::new(),
        );

        let record = cycle.record().unwrap();
        assert_eq!(record.tags, TagSet::new().with("env", "prod"));
        let stored = remote.entities.lock().unwrap();
        let entity = &stored[&vec!["arn:a".to_string(), "arn:b".to_string()]];
        assert!(entity.tags.contains_key("aws:autoscaling:groupName"));
    }

    #[test]
    fn test_delete_absent_entity_succeeds() {
        let remote = Memory::default();
        let policy = IgnorePolicy::none();
        let cycle = ResourceReconciler::new(&remote, &policy).delete(
            &Attachment,
            &identity(),
            &CancelToken::new(),
        );
        assert_eq!(cycle.phase(), Phase::NotFound);
    }
}
