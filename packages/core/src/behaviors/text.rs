//! Text filters
//!
//! DescriptiveTextAndImages spaces are short texts that usually come with an
//! image; TextOnly spaces are longer texts without images. Both store one
//! string per space row.

use serde_json::Value;

use super::{BehaviorError, MatrixFilterBehavior, SpaceContext, SpaceInput};
use crate::models::{EncodedSpace, MatrixFilterType};

fn parse_text(filter_type: MatrixFilterType, space: &Value) -> Result<EncodedSpace, BehaviorError> {
    match space.as_str() {
        Some(text) => Ok(EncodedSpace::Text(text.to_string())),
        None => Err(BehaviorError::invalid(
            filter_type,
            format!("expected a string, got {}", space),
        )),
    }
}

fn encode_text(
    filter_type: MatrixFilterType,
    input: &SpaceInput,
) -> Result<EncodedSpace, BehaviorError> {
    match input {
        SpaceInput::Text(text) if text.trim().is_empty() => {
            Err(BehaviorError::invalid(filter_type, "text cannot be empty"))
        }
        SpaceInput::Text(text) => Ok(EncodedSpace::Text(text.trim().to_string())),
        other => Err(BehaviorError::UnsupportedInput {
            filter_type,
            input: other.kind(),
        }),
    }
}

fn display_text(space: &EncodedSpace) -> String {
    match space {
        EncodedSpace::Text(text) => text.clone(),
        other => other.to_value().to_string(),
    }
}

pub struct DescriptiveTextAndImagesFilterBehavior;

impl MatrixFilterBehavior for DescriptiveTextAndImagesFilterBehavior {
    fn filter_type(&self) -> MatrixFilterType {
        MatrixFilterType::DescriptiveTextAndImages
    }

    fn validate_encoded_space(&self, space: &Value) -> bool {
        space.is_string()
    }

    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError> {
        parse_text(self.filter_type(), space)
    }

    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        _ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError> {
        encode_text(self.filter_type(), input)
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String {
        display_text(space)
    }
}

pub struct TextOnlyFilterBehavior;

impl MatrixFilterBehavior for TextOnlyFilterBehavior {
    fn filter_type(&self) -> MatrixFilterType {
        MatrixFilterType::TextOnly
    }

    fn validate_encoded_space(&self, space: &Value) -> bool {
        space.is_string()
    }

    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError> {
        parse_text(self.filter_type(), space)
    }

    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        _ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError> {
        encode_text(self.filter_type(), input)
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String {
        display_text(space)
    }
}
