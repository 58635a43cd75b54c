//! SSO permission set permissions boundary attachment

use super::Descriptor;
use reconcile::{Attribute, AttributeTree, Error, Kind, ResourceType, Result, Schema, Value};

const NAME: &str = "ssoadmin_permissions_boundary_attachment";

/// Attaches a permissions boundary to an SSO permission set.
///
/// Addressed by `permission_set_arn,instance_arn`. The boundary is either an
/// AWS managed policy ARN or a reference to a customer managed policy, never
/// both.
#[derive(Debug)]
pub struct PermissionsBoundaryAttachment;

impl ResourceType for PermissionsBoundaryAttachment {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Permissions boundary attached to an SSO permission set"
    }

    fn schema(&self) -> Schema {
        let reference = Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("path", Attribute::optional_string());

        let boundary = Schema::new()
            .attribute("managed_policy_arn", Attribute::optional_string())
            .attribute(
                "customer_managed_policy_reference",
                Attribute::optional(Kind::Single(reference)),
            );

        Schema::new()
            .attribute("permission_set_arn", Attribute::required_string())
            .attribute("instance_arn", Attribute::required_string())
            .attribute("permissions_boundary", Attribute::required(Kind::Single(boundary)))
    }

    fn identity_arity(&self) -> usize {
        2
    }

    fn supports_tags(&self) -> bool {
        false
    }

    fn validate(&self, tree: &AttributeTree) -> Result<()> {
        let managed = tree.lookup("permissions_boundary.0.managed_policy_arn");
        let reference = tree.lookup("permissions_boundary.0.customer_managed_policy_reference");
        let has_reference = !reference.elements().is_empty();

        match (managed, has_reference) {
            (Value::String(_), true) => Err(Error::InvalidConfig {
                resource_type: NAME.to_string(),
                message: "only one of managed_policy_arn or customer_managed_policy_reference \
                          may be given"
                    .to_string(),
            }),
            (Value::Unset, false) => Err(Error::InvalidConfig {
                resource_type: NAME.to_string(),
                message: "permissions_boundary needs managed_policy_arn or \
                          customer_managed_policy_reference"
                    .to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl Descriptor for PermissionsBoundaryAttachment {
    fn identifier_fields(&self) -> &'static [&'static str] {
        &["permission_set_arn", "instance_arn"]
    }
}
