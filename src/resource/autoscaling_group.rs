//! Auto Scaling group

use super::Descriptor;
use reconcile::{Attribute, Element, Kind, ResourceType, ScalarType, Schema};

/// An Auto Scaling group addressed by name.
///
/// Tags carry `propagate` (propagate at launch). The warm pool is a
/// singleton block and availability zones are an unordered set.
#[derive(Debug)]
pub struct AutoscalingGroup;

fn int() -> Kind {
    Kind::Scalar(ScalarType::Int)
}

impl ResourceType for AutoscalingGroup {
    fn name(&self) -> &'static str {
        "autoscaling_group"
    }

    fn description(&self) -> &'static str {
        "Auto Scaling group"
    }

    fn schema(&self) -> Schema {
        let reuse = Schema::new().attribute(
            "reuse_on_scale_in",
            Attribute::optional(Kind::Scalar(ScalarType::Bool)),
        );
        let warm_pool = Schema::new()
            .attribute("instance_reuse_policy", Attribute::optional(Kind::Single(reuse)))
            .attribute("max_group_prepared_capacity", Attribute::optional(int()))
            .attribute("min_size", Attribute::optional(int()))
            .attribute("pool_state", Attribute::optional_string());

        Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("arn", Attribute::computed_string())
            .attribute("min_size", Attribute::required(int()))
            .attribute("max_size", Attribute::required(int()))
            .attribute("desired_capacity", Attribute::optional(int()))
            .attribute("health_check_type", Attribute::optional_string())
            .attribute(
                "availability_zones",
                Attribute::optional(Kind::Set(Element::Scalar(ScalarType::String))),
            )
            .attribute(
                "target_group_arns",
                Attribute::optional(Kind::Set(Element::Scalar(ScalarType::String))),
            )
            .attribute("warm_pool", Attribute::optional(Kind::Single(warm_pool)))
            .attribute("warm_pool_size", Attribute::computed(int()))
            .attribute("status", Attribute::computed_string())
    }
}

impl Descriptor for AutoscalingGroup {
    fn identifier_fields(&self) -> &'static [&'static str] {
        &["name"]
    }
}
