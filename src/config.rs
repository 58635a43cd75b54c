//! cloudrec.toml configuration
//!
//! The file declares the ignore-tag policy, provider default tags, retry
//! settings and the resources to reconcile. Everything is loaded once at
//! startup; the resulting [`IgnorePolicy`] is shared read-only afterwards.

use crate::resource::{Descriptor, Registry};
use anyhow::{Context, Result};
use reconcile::bridge;
use reconcile::{
    AttributeTree, CompositeIdentity, Element, IdentityCodec, IgnorePolicy, Kind, RemoteObject,
    RemoteValue, RetryConfig, Schema, Tag, TagSet,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Problems in the declared configuration that are not TOML syntax errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown resource type {name:?} (known: {known})")]
    UnknownResourceType { name: String, known: String },

    #[error("{resource_type}: attribute {path} has unsupported TOML value ({kind})")]
    UnsupportedValue {
        resource_type: String,
        path: String,
        kind: &'static str,
    },

    #[error("{resource_type}: unknown attribute {path}")]
    UnknownAttribute { resource_type: String, path: String },

    #[error("{resource_type}: attribute {path} is assigned by the remote side and cannot be declared")]
    ComputedAttribute { resource_type: String, path: String },

    #[error("{resource_type}: identifier field {field:?} must be set to a string")]
    MissingIdentifier {
        resource_type: String,
        field: &'static str,
    },
}

// ============================================================================
// Config Structures
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudrecConfig {
    pub ignore_tags: IgnoreTagsConfig,

    /// Tags merged under every resource's own tags
    pub default_tags: BTreeMap<String, String>,

    pub retry: RetrySection,

    #[serde(rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreTagsConfig {
    /// Exact-match keys
    pub keys: Vec<String>,
    pub key_prefixes: Vec<String>,
    /// Glob patterns (`*`, `?`)
    pub patterns: Vec<String>,
    /// Ignore the provider's reserved `aws:*` keys
    pub provider_defaults: bool,
}

impl Default for IgnoreTagsConfig {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            key_prefixes: Vec::new(),
            patterns: Vec::new(),
            provider_defaults: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

/// One `[[resource]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Remote identifiers in identity order; taken from attributes when empty
    #[serde(default)]
    pub identifiers: Vec<String>,

    #[serde(default)]
    pub tags: BTreeMap<String, TagDecl>,

    #[serde(default)]
    pub attributes: toml::Table,
}

/// A tag value, optionally with a propagate flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagDecl {
    Value(String),
    Detailed {
        value: String,
        #[serde(default)]
        propagate: bool,
    },
}

/// A declaration resolved against the resource registry.
#[derive(Debug)]
pub struct Declared<'r> {
    pub kind: &'r dyn Descriptor,
    pub identity: CompositeIdentity,
    pub tree: AttributeTree,
    /// Effective local tags (defaults overlaid by the resource's own)
    pub tags: TagSet,
}

// ============================================================================
// Loading
// ============================================================================

impl CloudrecConfig {
    /// Load config from `path`; a missing file yields an empty config
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!(
            "Loaded {} resource declaration(s) from {}",
            config.resources.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the process-wide ignore policy.
    pub fn ignore_policy(&self) -> reconcile::Result<IgnorePolicy> {
        let section = &self.ignore_tags;
        let mut policy = if section.provider_defaults {
            IgnorePolicy::provider_default()
        } else {
            IgnorePolicy::none()
        };
        for key in &section.keys {
            policy = policy.with_key(key.as_str());
        }
        for prefix in &section.key_prefixes {
            policy = policy.with_key_prefix(prefix.as_str());
        }
        for pattern in &section.patterns {
            policy = policy.with_pattern(pattern)?;
        }
        Ok(policy)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
            ..RetryConfig::default()
        }
    }

    /// Effective local tags for a declaration.
    pub fn local_tags(&self, decl: &ResourceDecl) -> TagSet {
        let defaults: TagSet = self
            .default_tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        defaults.merged_with(&decl.tag_set())
    }

    /// Resolve every declaration against the registry.
    pub fn resolve<'r>(
        &self,
        registry: &'r Registry,
        codec: &IdentityCodec,
    ) -> Result<Vec<Declared<'r>>> {
        self.resources
            .iter()
            .map(|decl| {
                let kind = registry.get(&decl.resource_type).ok_or_else(|| {
                    ConfigError::UnknownResourceType {
                        name: decl.resource_type.clone(),
                        known: registry.names().join(", "),
                    }
                })?;
                let tree = decl.attribute_tree(kind)?;
                let identity = decl.identity(kind, &tree, codec)?;
                Ok(Declared {
                    kind,
                    identity,
                    tree,
                    tags: self.local_tags(decl),
                })
            })
            .collect()
    }
}

impl ResourceDecl {
    /// The resource's own tags.
    pub fn tag_set(&self) -> TagSet {
        self.tags
            .iter()
            .map(|(key, decl)| match decl {
                TagDecl::Value(value) => Tag::new(key.as_str(), value.as_str()),
                TagDecl::Detailed { value, propagate } => {
                    Tag::new(key.as_str(), value.as_str()).propagating(*propagate)
                }
            })
            .collect()
    }

    /// Declared attributes as a tree shaped by the type's schema.
    pub fn attribute_tree(&self, kind: &dyn Descriptor) -> Result<AttributeTree> {
        let schema = kind.schema();
        check_declared(&self.resource_type, &schema, &self.attributes, "")?;
        let object = toml_object(&self.resource_type, &self.attributes, "")?;
        let tree = bridge::flatten(&schema, &object)
            .with_context(|| format!("Invalid attributes for {}", self.resource_type))?;
        Ok(tree)
    }

    /// Composite identity from explicit identifiers or identifier attributes.
    pub fn identity(
        &self,
        kind: &dyn Descriptor,
        tree: &AttributeTree,
        codec: &IdentityCodec,
    ) -> Result<CompositeIdentity> {
        let components = if self.identifiers.is_empty() {
            kind.identifier_fields()
                .iter()
                .map(|&field| {
                    tree.get(field)
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ConfigError::MissingIdentifier {
                            resource_type: self.resource_type.clone(),
                            field,
                        })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            self.identifiers.clone()
        };

        let identity = codec.encode(components.as_slice())?;
        // Arity is checked by decoding what was just encoded.
        codec.decode(&identity, kind.identity_arity())?;
        Ok(identity)
    }
}

/// Every declared name must exist in the schema and be settable locally.
/// Shape mismatches are left to the bridge.
fn check_declared(
    resource_type: &str,
    schema: &Schema,
    table: &toml::Table,
    prefix: &str,
) -> std::result::Result<(), ConfigError> {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let Some(attribute) = schema.get(key) else {
            return Err(ConfigError::UnknownAttribute {
                resource_type: resource_type.to_string(),
                path,
            });
        };
        if attribute.is_computed() {
            return Err(ConfigError::ComputedAttribute {
                resource_type: resource_type.to_string(),
                path,
            });
        }
        match (&attribute.kind, value) {
            (Kind::Single(block), toml::Value::Table(inner)) => {
                check_declared(resource_type, block, inner, &path)?;
            }
            (
                Kind::List(Element::Block(block)) | Kind::Set(Element::Block(block)),
                toml::Value::Array(items),
            ) => {
                for (index, item) in items.iter().enumerate() {
                    if let toml::Value::Table(inner) = item {
                        check_declared(resource_type, block, inner, &format!("{path}.{index}"))?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn toml_object(resource_type: &str, table: &toml::Table, prefix: &str) -> Result<RemoteObject> {
    table
        .iter()
        .map(|(key, value)| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            Ok((key.clone(), toml_value(resource_type, value, &path)?))
        })
        .collect()
}

fn toml_value(resource_type: &str, value: &toml::Value, path: &str) -> Result<RemoteValue> {
    let unsupported = |kind| ConfigError::UnsupportedValue {
        resource_type: resource_type.to_string(),
        path: path.to_string(),
        kind,
    };
    Ok(match value {
        toml::Value::String(s) => RemoteValue::String(s.clone()),
        toml::Value::Integer(i) => RemoteValue::Int(*i),
        toml::Value::Boolean(b) => RemoteValue::Bool(*b),
        toml::Value::Array(items) => RemoteValue::Seq(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| toml_value(resource_type, item, &format!("{path}.{i}")))
                .collect::<Result<_>>()?,
        ),
        toml::Value::Table(table) => {
            RemoteValue::Object(toml_object(resource_type, table, path)?)
        }
        toml::Value::Float(_) => return Err(unsupported("float").into()),
        toml::Value::Datetime(_) => return Err(unsupported("datetime").into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::Value;

    const SAMPLE: &str = r#"
[ignore_tags]
keys = ["CreatedBy"]
key_prefixes = ["kubernetes.io/"]
patterns = ["team:*"]

[default_tags]
Owner = "platform"
env = "dev"

[retry]
max_attempts = 3
base_delay_ms = 50

[[resource]]
type = "ssoadmin_permissions_boundary_attachment"
identifiers = ["arn:aws:sso:::permissionSet/ssoins-1/ps-1", "arn:aws:sso:::instance/ssoins-1"]
[resource.attributes]
permission_set_arn = "arn:aws:sso:::permissionSet/ssoins-1/ps-1"
instance_arn = "arn:aws:sso:::instance/ssoins-1"
[resource.attributes.permissions_boundary.customer_managed_policy_reference]
name = "policy1"
path = "/"

[[resource]]
type = "autoscaling_group"
[resource.tags]
env = "prod"
Name = { value = "web", propagate = true }
[resource.attributes]
name = "web"
min_size = 1
max_size = 3
availability_zones = ["us-east-1b", "us-east-1a"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = CloudrecConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.retry.max_attempts, 3);
        // Unset fields keep their defaults
        assert_eq!(config.retry.max_delay_ms, RetrySection::default().max_delay_ms);
        assert!(config.ignore_tags.provider_defaults);
    }

    #[test]
    fn test_ignore_policy_from_config() {
        let policy = CloudrecConfig::parse(SAMPLE).unwrap().ignore_policy().unwrap();
        assert!(policy.ignores("aws:cloudformation:stack-name"));
        assert!(policy.ignores("CreatedBy"));
        assert!(policy.ignores("kubernetes.io/cluster/main"));
        assert!(policy.ignores("team:payments"));
        assert!(!policy.ignores("env"));
    }

    #[test]
    fn test_provider_defaults_can_be_disabled() {
        let config = CloudrecConfig::parse("[ignore_tags]\nprovider_defaults = false\n").unwrap();
        assert!(!config.ignore_policy().unwrap().ignores("aws:x"));
    }

    #[test]
    fn test_retry_config() {
        let retry = CloudrecConfig::parse(SAMPLE).unwrap().retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_resource_tags_override_defaults() {
        let config = CloudrecConfig::parse(SAMPLE).unwrap();
        let tags = config.local_tags(&config.resources[1]);
        assert_eq!(tags.get("env").unwrap().value, "prod");
        assert_eq!(tags.get("Owner").unwrap().value, "platform");
        assert!(tags.get("Name").unwrap().propagate);
    }

    #[test]
    fn test_resolve_declarations() {
        let config = CloudrecConfig::parse(SAMPLE).unwrap();
        let registry = Registry::builtin();
        let declared = config.resolve(&registry, &IdentityCodec::default()).unwrap();

        assert_eq!(
            declared[0].identity.as_str(),
            "arn:aws:sso:::permissionSet/ssoins-1/ps-1,arn:aws:sso:::instance/ssoins-1"
        );
        assert_eq!(
            declared[0]
                .tree
                .lookup("permissions_boundary.0.customer_managed_policy_reference.0.name")
                .as_str(),
            Some("policy1")
        );

        // Identity derived from the name attribute
        assert_eq!(declared[1].identity.as_str(), "web");
        assert_eq!(
            declared[1].tree.get("availability_zones").elements().len(),
            2
        );
        assert!(declared[1].tree.get("desired_capacity").is_unset());
        assert_eq!(declared[1].tree.get("warm_pool"), &Value::List(vec![]));
    }

    #[test]
    fn test_unknown_resource_type() {
        let config = CloudrecConfig::parse("[[resource]]\ntype = \"s3_bucket\"\n").unwrap();
        let err = config
            .resolve(&Registry::builtin(), &IdentityCodec::default())
            .unwrap_err();
        assert!(err.to_string().contains("unknown resource type"));
    }

    #[test]
    fn test_wrong_identifier_count() {
        let config = CloudrecConfig::parse(
            "[[resource]]\ntype = \"ssoadmin_permissions_boundary_attachment\"\nidentifiers = [\"arn:a\"]\n",
        )
        .unwrap();
        let err = config
            .resolve(&Registry::builtin(), &IdentityCodec::default())
            .unwrap_err();
        assert!(err.to_string().contains("malformed identity"));
    }

    #[test]
    fn test_float_attribute_rejected() {
        let config = CloudrecConfig::parse(
            "[[resource]]\ntype = \"dynamodb_table\"\n[resource.attributes]\nname = \"t\"\nread_capacity = 1.5\n",
        )
        .unwrap();
        let err = config
            .resolve(&Registry::builtin(), &IdentityCodec::default())
            .unwrap_err();
        assert!(err.to_string().contains("float"));
    }

    fn resolve_err(content: &str) -> ConfigError {
        let config = CloudrecConfig::parse(content).unwrap();
        config
            .resolve(&Registry::builtin(), &IdentityCodec::default())
            .unwrap_err()
            .downcast::<ConfigError>()
            .unwrap()
    }

    #[test]
    fn test_computed_attribute_rejected() {
        let err = resolve_err(
            "[[resource]]\ntype = \"autoscaling_group\"\n[resource.attributes]\nname = \"web\"\nmin_size = 1\nmax_size = 3\narn = \"arn:aws:autoscaling:web\"\n",
        );
        assert!(matches!(err, ConfigError::ComputedAttribute { ref path, .. } if path == "arn"));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let err = resolve_err(
            "[[resource]]\ntype = \"autoscaling_group\"\n[resource.attributes]\nname = \"web\"\nmin_size = 1\nmax_sise = 9\n",
        );
        assert!(matches!(err, ConfigError::UnknownAttribute { ref path, .. } if path == "max_sise"));
    }

    #[test]
    fn test_nested_names_checked() {
        let err = resolve_err(
            r#"
[[resource]]
type = "dynamodb_table"
[resource.attributes]
name = "orders"
hash_key = "id"
attribute = [{ name = "id", type = "S", kind = "hash" }]
"#,
        );
        assert!(
            matches!(err, ConfigError::UnknownAttribute { ref path, .. } if path == "attribute.0.kind")
        );

        let err = resolve_err(
            r#"
[[resource]]
type = "ssoadmin_permissions_boundary_attachment"
identifiers = ["arn:ps", "arn:i"]
[resource.attributes.permissions_boundary.customer_managed_policy_reference]
name = "policy1"
paht = "/"
"#,
        );
        assert!(matches!(
            err,
            ConfigError::UnknownAttribute { ref path, .. }
                if path == "permissions_boundary.customer_managed_policy_reference.paht"
        ));
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = CloudrecConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.resources.is_empty());
    }
}
