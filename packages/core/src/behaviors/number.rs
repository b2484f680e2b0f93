//! Number filter: one sorted set of numbers per filter and per node

use serde_json::Value;

use super::{as_finite, BehaviorError, MatrixFilterBehavior, SpaceContext, SpaceInput};
use crate::models::{EncodedSpace, FilterDefinition, FilterParameters, MatrixFilterType};

pub struct NumberFilterBehavior;

impl NumberFilterBehavior {
    fn sorted(numbers: &[f64]) -> Result<EncodedSpace, BehaviorError> {
        if numbers.iter().any(|n| !n.is_finite()) {
            return Err(BehaviorError::invalid(
                MatrixFilterType::Number,
                "numbers must be finite",
            ));
        }
        let mut numbers = numbers.to_vec();
        numbers.sort_by(f64::total_cmp);
        Ok(EncodedSpace::Numbers(numbers))
    }

    /// Accepts JSON numbers and numeric strings such as `"3.50"`
    fn number_from(value: &Value) -> Option<f64> {
        match value {
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            other => as_finite(other),
        }
    }
}

impl MatrixFilterBehavior for NumberFilterBehavior {
    fn filter_type(&self) -> MatrixFilterType {
        MatrixFilterType::Number
    }

    fn default_definition(&self) -> FilterDefinition {
        FilterDefinition {
            allow_multiple_values: false,
            parameters: FilterParameters::Number {
                unit: String::new(),
                unit_verbose: String::new(),
            },
        }
    }

    fn validate_encoded_space(&self, space: &Value) -> bool {
        matches!(space.as_array(), Some(numbers) if numbers.iter().all(Value::is_number))
    }

    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError> {
        if !self.validate_encoded_space(space) {
            return Err(BehaviorError::invalid(
                MatrixFilterType::Number,
                format!("expected a list of numbers, got {}", space),
            ));
        }
        let numbers: Vec<f64> = space
            .as_array()
            .map(|items| items.iter().map(|n| as_finite(n).unwrap_or(f64::NAN)).collect())
            .unwrap_or_default();
        Self::sorted(&numbers)
    }

    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        _ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError> {
        match input {
            SpaceInput::Numbers(numbers) => Self::sorted(numbers),
            other => Err(BehaviorError::UnsupportedInput {
                filter_type: MatrixFilterType::Number,
                input: other.kind(),
            }),
        }
    }

    fn encode_entity_form_value(&self, value: &Value) -> Result<EncodedSpace, BehaviorError> {
        let items = value.as_array().ok_or_else(|| {
            BehaviorError::invalid(
                MatrixFilterType::Number,
                format!("expected a list of numbers, got {}", value),
            )
        })?;

        let numbers = items
            .iter()
            .map(|item| {
                Self::number_from(item).ok_or_else(|| {
                    BehaviorError::invalid(
                        MatrixFilterType::Number,
                        format!("{} is not a number", item),
                    )
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        Self::sorted(&numbers)
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String {
        match space {
            EncodedSpace::Numbers(numbers) => numbers
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_value().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_encoded_space() {
        let behavior = NumberFilterBehavior;
        assert!(behavior.validate_encoded_space(&json!([])));
        assert!(behavior.validate_encoded_space(&json!([2, 3.5, 4, 8])));
        assert!(!behavior.validate_encoded_space(&json!([2, "3"])));
        assert!(!behavior.validate_encoded_space(&json!(2)));
    }

    #[test]
    fn test_entity_values_sorted_as_floats() {
        let encoded = NumberFilterBehavior
            .encode_entity_form_value(&json!(["8", 2, "3.50"]))
            .unwrap();
        assert_eq!(encoded, EncodedSpace::Numbers(vec![2.0, 3.5, 8.0]));
        assert_eq!(NumberFilterBehavior.decode_for_display(&encoded), "2, 3.5, 8");
    }

    #[test]
    fn test_entity_value_rejects_text() {
        assert!(NumberFilterBehavior
            .encode_entity_form_value(&json!(["eight"]))
            .is_err());
        assert!(NumberFilterBehavior
            .encode_entity_form_value(&json!(4))
            .is_err());
    }
}
