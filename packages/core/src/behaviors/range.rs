//! Range filter: one `[min, max]` interval per filter and per node

use serde_json::{json, Value};

use super::{as_finite, BehaviorError, MatrixFilterBehavior, SpaceContext, SpaceInput};
use crate::models::{EncodedSpace, FilterDefinition, FilterParameters, MatrixFilterType};

pub struct RangeFilterBehavior;

impl RangeFilterBehavior {
    fn checked(min: f64, max: f64) -> Result<EncodedSpace, BehaviorError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(BehaviorError::invalid(
                MatrixFilterType::Range,
                "bounds must be finite numbers",
            ));
        }
        if min > max {
            return Err(BehaviorError::invalid(
                MatrixFilterType::Range,
                format!("min {} is greater than max {}", min, max),
            ));
        }
        Ok(EncodedSpace::Range { min, max })
    }
}

impl MatrixFilterBehavior for RangeFilterBehavior {
    fn filter_type(&self) -> MatrixFilterType {
        MatrixFilterType::Range
    }

    fn default_definition(&self) -> FilterDefinition {
        FilterDefinition {
            allow_multiple_values: false,
            parameters: FilterParameters::Range {
                step: 1.0,
                unit: String::new(),
                unit_verbose: String::new(),
            },
        }
    }

    fn get_empty_encoded_space(&self) -> Value {
        json!([0, 0])
    }

    fn validate_encoded_space(&self, space: &Value) -> bool {
        matches!(space.as_array(), Some(bounds) if bounds.len() == 2 && bounds.iter().all(Value::is_number))
    }

    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError> {
        if !self.validate_encoded_space(space) {
            return Err(BehaviorError::invalid(
                MatrixFilterType::Range,
                format!("expected [min, max], got {}", space),
            ));
        }
        let min = as_finite(&space[0]).unwrap_or(f64::NAN);
        let max = as_finite(&space[1]).unwrap_or(f64::NAN);
        Self::checked(min, max)
    }

    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        _ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError> {
        match input {
            SpaceInput::Range { min, max } => Self::checked(*min, *max),
            other => Err(BehaviorError::UnsupportedInput {
                filter_type: MatrixFilterType::Range,
                input: other.kind(),
            }),
        }
    }

    // the assigned value already has the [min, max] shape
    fn encode_entity_form_value(&self, value: &Value) -> Result<EncodedSpace, BehaviorError> {
        self.parse_encoded_space(value)
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String {
        match space {
            EncodedSpace::Range { min, max } => format!("{}-{}", min, max),
            other => other.to_value().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::StaticTaxonomySource;

    #[test]
    fn test_validate_encoded_space() {
        let behavior = RangeFilterBehavior;
        assert!(behavior.validate_encoded_space(&json!([0, 0])));
        assert!(behavior.validate_encoded_space(&json!([1.5, 4])));
        assert!(!behavior.validate_encoded_space(&json!([1])));
        assert!(!behavior.validate_encoded_space(&json!([1, "2"])));
        assert!(!behavior.validate_encoded_space(&json!({"min": 1, "max": 2})));
    }

    #[test]
    fn test_entity_value_is_kept() {
        let encoded = RangeFilterBehavior
            .encode_entity_form_value(&json!([1.5, 4]))
            .unwrap();
        assert_eq!(encoded, EncodedSpace::Range { min: 1.5, max: 4.0 });
        assert_eq!(encoded.to_value(), json!([1.5, 4.0]));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        assert!(RangeFilterBehavior
            .encode_entity_form_value(&json!([4, 1]))
            .is_err());
    }

    #[test]
    fn test_form_input() {
        let taxonomy = StaticTaxonomySource::default();
        let ctx = SpaceContext {
            current: None,
            taxonomy: &taxonomy,
            sources: &[],
        };
        let encoded = RangeFilterBehavior
            .encode_space_from_form(&SpaceInput::Range { min: 0.0, max: 12.0 }, &ctx)
            .unwrap();
        assert_eq!(RangeFilterBehavior.decode_for_display(&encoded), "0-12");
        assert!(RangeFilterBehavior
            .encode_space_from_form(&SpaceInput::Text("x".into()), &ctx)
            .is_err());
    }
}
