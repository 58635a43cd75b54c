//! DynamoDB table

use super::Descriptor;
use reconcile::{Attribute, Element, Kind, ResourceType, ScalarType, Schema};

#[derive(Debug)]
pub struct DynamodbTable;

impl ResourceType for DynamodbTable {
    fn name(&self) -> &'static str {
        "dynamodb_table"
    }

    fn description(&self) -> &'static str {
        "DynamoDB table"
    }

    fn schema(&self) -> Schema {
        let attribute = Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("type", Attribute::required_string());

        let index = Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("hash_key", Attribute::required_string())
            .attribute("range_key", Attribute::optional_string())
            .attribute("projection_type", Attribute::required_string())
            .attribute(
                "non_key_attributes",
                Attribute::optional(Kind::List(Element::Scalar(ScalarType::String))),
            )
            .attribute("read_capacity", Attribute::optional(Kind::Scalar(ScalarType::Int)))
            .attribute("write_capacity", Attribute::optional(Kind::Scalar(ScalarType::Int)));

        let ttl = Schema::new()
            .attribute("attribute_name", Attribute::required_string())
            .attribute("enabled", Attribute::optional(Kind::Scalar(ScalarType::Bool)));

        Schema::new()
            .attribute("name", Attribute::required_string())
            .attribute("arn", Attribute::computed_string())
            .attribute("hash_key", Attribute::required_string())
            .attribute("range_key", Attribute::optional_string())
            .attribute("billing_mode", Attribute::optional_string())
            .attribute("read_capacity", Attribute::optional(Kind::Scalar(ScalarType::Int)))
            .attribute("write_capacity", Attribute::optional(Kind::Scalar(ScalarType::Int)))
            .attribute("attribute", Attribute::required(Kind::Set(Element::Block(attribute))))
            .attribute(
                "global_secondary_index",
                Attribute::optional(Kind::List(Element::Block(index))),
            )
            .attribute("ttl", Attribute::optional(Kind::Single(ttl)))
            .attribute("stream_arn", Attribute::computed_string())
    }
}

impl Descriptor for DynamodbTable {
    fn identifier_fields(&self) -> &'static [&'static str] {
        &["name"]
    }
}
