//! Resource type descriptors shipped with cloudrec
//!
//! Each descriptor declares only the attributes needed to exercise the
//! reconciliation core; the full provider schemas are much larger.

mod autoscaling_group;
mod dynamodb_table;
mod permissions_boundary_attachment;

pub use autoscaling_group::AutoscalingGroup;
pub use dynamodb_table::DynamodbTable;
pub use permissions_boundary_attachment::PermissionsBoundaryAttachment;

use reconcile::ResourceType;

/// A resource type the CLI knows how to address.
pub trait Descriptor: ResourceType {
    /// Attribute names holding the identifier components, in identity order
    ///
    /// Used when a declaration omits explicit identifiers and when the
    /// snapshot remote assigns identifiers on create.
    fn identifier_fields(&self) -> &'static [&'static str];
}

/// All known resource types, looked up by name.
pub struct Registry {
    descriptors: Vec<Box<dyn Descriptor>>,
}

impl Registry {
    pub fn builtin() -> Self {
        Self {
            descriptors: vec![
                Box::new(PermissionsBoundaryAttachment),
                Box::new(AutoscalingGroup),
                Box::new(DynamodbTable),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Descriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name() == name)
            .map(AsRef::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Descriptor> {
        self.descriptors.iter().map(AsRef::as_ref)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|d| d.name()).collect()
    }
}
