//! Tag reconciliation
//!
//! Three views of a resource's tags meet here: the tags declared locally,
//! the tags observed on the remote entity, and the provider-wide
//! [`IgnorePolicy`]. [`view`] produces what the declarative layer shows and
//! [`diff`] produces what must be pushed to the remote side.
//!
//! The policy is always passed in explicitly; nothing here reads global
//! state, so every function is pure.

use crate::error::{Error, Result};
use crate::hash::{self, Canonical, Digest};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Key prefix reserved by the cloud provider for tags it manages itself.
pub const PROVIDER_RESERVED_PREFIX: &str = "aws:";

/// A single tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
    /// Whether child entities inherit this tag
    #[serde(default)]
    pub propagate: bool,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            propagate: false,
        }
    }

    pub fn propagating(mut self, propagate: bool) -> Self {
        self.propagate = propagate;
        self
    }
}

impl Canonical for Tag {
    fn canonical_form(&self) -> String {
        format!(
            "{}{}-",
            hash::pair_form(&self.key, &self.value),
            self.propagate
        )
    }
}

/// An unordered collection of tags with unique keys.
///
/// Equality is digest equality, so insertion order never matters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Tag>", into = "Vec<Tag>")]
pub struct TagSet {
    tags: BTreeMap<String, Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, replacing any existing tag with the same key.
    pub fn insert(&mut self, tag: Tag) -> Option<Tag> {
        self.tags.insert(tag.key.clone(), tag)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(Tag::new(key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.tags.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Tag> {
        self.tags.remove(key)
    }

    /// Tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Order-independent content digest.
    pub fn digest(&self) -> Digest {
        hash::digest_items(self.tags.values())
    }

    /// Overlay `overrides` on top of `self`; overriding keys win.
    pub fn merged_with(&self, overrides: &TagSet) -> TagSet {
        let mut merged = self.clone();
        for tag in overrides.iter() {
            merged.insert(tag.clone());
        }
        merged
    }

    /// Keep only the tags the policy does not ignore.
    pub fn without_ignored(&self, policy: &IgnorePolicy) -> TagSet {
        self.iter()
            .filter(|t| !policy.ignores(&t.key))
            .cloned()
            .collect()
    }

    /// Plain key-value map (drops propagate flags).
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect()
    }
}

impl PartialEq for TagSet {
    fn eq(&self, other: &Self) -> bool {
        self.digest() == other.digest()
    }
}

impl Eq for TagSet {}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl From<Vec<Tag>> for TagSet {
    fn from(tags: Vec<Tag>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<TagSet> for Vec<Tag> {
    fn from(set: TagSet) -> Self {
        set.tags.into_values().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| Tag::new(k, v)).collect()
    }
}

/// Rules excluding tag keys from reconciliation.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    keys: BTreeSet<String>,
    key_prefixes: Vec<String>,
    patterns: Vec<(String, Regex)>,
}

impl IgnorePolicy {
    /// A policy that ignores nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// A policy that ignores the provider's reserved `aws:*` keys.
    pub fn provider_default() -> Self {
        Self::default().with_key_prefix(PROVIDER_RESERVED_PREFIX)
    }

    /// Ignore a key by exact match.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    /// Ignore every key starting with `prefix`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefixes.push(prefix.into());
        self
    }

    /// Ignore keys matching a glob pattern (`*` any run, `?` one character).
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(&glob_regex_source(pattern)).map_err(|source| {
            Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        self.patterns.push((pattern.to_string(), regex));
        Ok(self)
    }

    /// Whether a key matches any rule.
    pub fn ignores(&self, key: &str) -> bool {
        self.keys.contains(key)
            || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()))
            || self.patterns.iter().any(|(_, re)| re.is_match(key))
    }

    /// Glob patterns as written.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.key_prefixes.is_empty() && self.patterns.is_empty()
    }
}

fn glob_regex_source(pattern: &str) -> String {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    source
}

/// Tag changes that must be pushed to the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDiff {
    pub to_add: TagSet,
    pub to_remove: TagSet,
    /// Local versions of tags whose value or propagate flag changed
    pub to_update: TagSet,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }

    /// Total number of tag changes.
    pub fn total(&self) -> usize {
        self.to_add.len() + self.to_remove.len() + self.to_update.len()
    }
}

/// Split remote tags into `(visible, ignored)`.
pub fn partition(remote: &TagSet, policy: &IgnorePolicy) -> (TagSet, TagSet) {
    let mut visible = TagSet::new();
    let mut ignored = TagSet::new();
    for tag in remote.iter() {
        if policy.ignores(&tag.key) {
            ignored.insert(tag.clone());
        } else {
            visible.insert(tag.clone());
        }
    }
    (visible, ignored)
}

/// The tag view exposed to the declarative layer.
///
/// This is the remote tags minus ignored keys. Propagate flags come from
/// the remote side unchanged.
pub fn view(local: &TagSet, remote: &TagSet, policy: &IgnorePolicy) -> TagSet {
    let (visible, ignored) = partition(remote, policy);
    log::trace!(
        "tag view: {} visible, {} ignored, {} declared locally",
        visible.len(),
        ignored.len(),
        local.len()
    );
    visible
}

/// Tag changes needed to bring the remote side in line with `local`.
///
/// Keys matched by the policy never appear in the output, even when they
/// are declared locally.
pub fn diff(local: &TagSet, remote: &TagSet, policy: &IgnorePolicy) -> TagDiff {
    let (visible, _) = partition(remote, policy);
    let mut out = TagDiff::default();

    for tag in local.iter() {
        if policy.ignores(&tag.key) {
            continue;
        }
        match visible.get(&tag.key) {
            None => {
                out.to_add.insert(tag.clone());
            }
            Some(current) if current.value != tag.value || current.propagate != tag.propagate => {
                out.to_update.insert(tag.clone());
            }
            Some(_) => {}
        }
    }

    for tag in visible.iter() {
        if !local.contains_key(&tag.key) {
            out.to_remove.insert(tag.clone());
        }
    }

    out
}

/// Apply a diff to a tag set, as the remote side would.
pub fn apply_diff(remote: &TagSet, changes: &TagDiff) -> TagSet {
    let mut result = remote.clone();
    for tag in changes.to_remove.iter() {
        result.remove(&tag.key);
    }
    for tag in changes.to_add.iter().chain(changes.to_update.iter()) {
        result.insert(tag.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn aws_policy() -> IgnorePolicy {
        IgnorePolicy::none().with_pattern("aws:*").unwrap()
    }

    #[test]
    fn test_scenario_env_drift_with_reserved_tag() {
        let local = TagSet::new().with("env", "prod");
        let remote = TagSet::new()
            .with("env", "staging")
            .with("aws:autoscaling:groupName", "x");
        let policy = aws_policy();

        assert_eq!(
            view(&local, &remote, &policy),
            TagSet::new().with("env", "staging")
        );

        let changes = diff(&local, &remote, &policy);
        assert_eq!(changes.to_update, TagSet::new().with("env", "prod"));
        assert!(changes.to_add.is_empty());
        assert!(changes.to_remove.is_empty());
    }

    #[test]
    fn test_diff_add_remove_update() {
        let local = TagSet::new().with("a", "1").with("b", "2");
        let remote = TagSet::new().with("b", "3").with("c", "4");
        let changes = diff(&local, &remote, &IgnorePolicy::none());
        assert_eq!(changes.to_add, TagSet::new().with("a", "1"));
        assert_eq!(changes.to_update, TagSet::new().with("b", "2"));
        assert_eq!(changes.to_remove, TagSet::new().with("c", "4"));
        assert_eq!(changes.total(), 3);
    }

    #[test]
    fn test_propagate_change_is_update() {
        let mut local = TagSet::new();
        local.insert(Tag::new("env", "prod").propagating(true));
        let remote = TagSet::new().with("env", "prod");
        let changes = diff(&local, &remote, &IgnorePolicy::none());
        assert_eq!(changes.to_update.len(), 1);
        assert!(changes.to_update.get("env").unwrap().propagate);
    }

    #[test]
    fn test_view_keeps_remote_propagate() {
        let local = TagSet::new().with("env", "prod");
        let mut remote = TagSet::new();
        remote.insert(Tag::new("env", "prod").propagating(true));
        let shown = view(&local, &remote, &IgnorePolicy::none());
        assert!(shown.get("env").unwrap().propagate);
    }

    #[test]
    fn test_locally_declared_ignored_key_is_never_pushed() {
        let local = TagSet::new().with("aws:cloudformation:stack", "mine");
        let remote = TagSet::new().with("aws:cloudformation:stack", "theirs");
        let changes = diff(&local, &remote, &aws_policy());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_policy_rules() {
        let policy = IgnorePolicy::provider_default()
            .with_key("CreatedBy")
            .with_key_prefix("kubernetes.io/")
            .with_pattern("team-?")
            .unwrap();
        assert!(policy.ignores("aws:autoscaling:groupName"));
        assert!(policy.ignores("CreatedBy"));
        assert!(!policy.ignores("CreatedByX"));
        assert!(policy.ignores("kubernetes.io/cluster/x"));
        assert!(policy.ignores("team-a"));
        assert!(!policy.ignores("team-ab"));
        assert!(!policy.ignores("env"));
    }

    #[test]
    fn test_pattern_escapes_regex_metacharacters() {
        let policy = IgnorePolicy::none().with_pattern("a.b*").unwrap();
        assert!(policy.ignores("a.bc"));
        assert!(!policy.ignores("axbc"));
    }

    #[test]
    fn test_tagset_equality_ignores_order() {
        let a: TagSet = vec![Tag::new("x", "1"), Tag::new("y", "2")].into();
        let b: TagSet = vec![Tag::new("y", "2"), Tag::new("x", "1")].into();
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a, TagSet::new().with("x", "1"));
    }

    #[test]
    fn test_merged_with_overrides_win() {
        let defaults = TagSet::new().with("Owner", "platform").with("env", "dev");
        let resource = TagSet::new().with("env", "prod");
        let merged = defaults.merged_with(&resource);
        assert_eq!(merged.get("env").unwrap().value, "prod");
        assert_eq!(merged.get("Owner").unwrap().value, "platform");
    }

    #[test]
    fn test_diff_output_is_deterministic() {
        let local: TagSet = [("z", "1"), ("a", "2"), ("m", "3")].into_iter().collect();
        let remote: TagSet = [("q", "9")].into_iter().collect();
        let first = serde_json::to_string(&diff(&local, &remote, &IgnorePolicy::none())).unwrap();
        let second = serde_json::to_string(&diff(&local, &remote, &IgnorePolicy::none())).unwrap();
        assert_eq!(first, second);

        let changes = diff(&local, &remote, &IgnorePolicy::none());
        let added: Vec<&str> = changes.to_add.keys().collect();
        assert_eq!(added, vec!["a", "m", "z"]);
    }

    fn tag_strategy() -> impl Strategy<Value = TagSet> {
        prop::collection::vec(
            (
                prop_oneof!["[a-c]{1,2}", "aws:[a-c]{1,2}"],
                "[0-2]{1}",
                any::<bool>(),
            ),
            0..6,
        )
        .prop_map(|tags| {
            tags.into_iter()
                .map(|(k, v, p)| Tag::new(k, v).propagating(p))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_diff_then_apply_is_idempotent(local in tag_strategy(), remote in tag_strategy()) {
            let policy = aws_policy();
            let changes = diff(&local, &remote, &policy);
            let updated = apply_diff(&remote, &changes);
            prop_assert!(diff(&local, &updated, &policy).is_empty());
            prop_assert!(diff(&local, &local, &policy).is_empty());
        }

        #[test]
        fn prop_ignored_keys_never_in_diff(local in tag_strategy(), remote in tag_strategy()) {
            let policy = aws_policy();
            let changes = diff(&local, &remote, &policy);
            for tag in changes.to_add.iter().chain(changes.to_remove.iter()).chain(changes.to_update.iter()) {
                prop_assert!(!policy.ignores(&tag.key));
            }
        }
    }
}
