//! Matrix Filter Behavior System
//!
//! This module provides the per-type behavior of matrix filters:
//!
//! - `MatrixFilterBehavior` trait - encoding, validation and display of filter spaces
//! - Built-in behaviors (RangeFilterBehavior, ColorFilterBehavior, etc.)
//! - [`behavior_for`] - exhaustive lookup from [`MatrixFilterType`] to its behavior
//!
//! The set of filter types is closed, so dispatch is a plain `match` and adding a
//! type is a compile error everywhere it is not handled yet.

pub mod color;
pub mod number;
pub mod range;
pub mod taxon;
pub mod text;

pub use color::ColorFilterBehavior;
pub use number::NumberFilterBehavior;
pub use range::RangeFilterBehavior;
pub use taxon::{
    StaticTaxonomySource, TaxonFilterBehavior, TaxonomySource, PREDEFINED_TAXONOMIC_FILTERS,
};
pub use text::{DescriptiveTextAndImagesFilterBehavior, TextOnlyFilterBehavior};

use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{
    EncodedSpace, FilterDefinition, MatrixFilterSpace, MatrixFilterType, NodeFilterSpace,
    NodeTaxon, SpaceId,
};

/// Errors raised while encoding or validating filter spaces
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BehaviorError {
    #[error("Invalid space for {filter_type}: {reason}")]
    InvalidEncodedSpace {
        filter_type: MatrixFilterType,
        reason: String,
    },

    #[error("{filter_type} cannot encode {input} input")]
    UnsupportedInput {
        filter_type: MatrixFilterType,
        input: &'static str,
    },

    #[error("{0} values are assigned through filter spaces, not inline")]
    NotInlineAssignable(MatrixFilterType),
}

impl BehaviorError {
    pub fn invalid(filter_type: MatrixFilterType, reason: impl Into<String>) -> Self {
        Self::InvalidEncodedSpace {
            filter_type,
            reason: reason.into(),
        }
    }
}

/// Authoring input that defines a filter's space or one of its values
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceInput {
    Range { min: f64, max: f64 },
    Numbers(Vec<f64>),
    /// `#RRGGBB` or `#RRGGBBAA`
    Hex(String),
    Text(String),
    /// Selected taxonomic filter latnames plus an optional custom taxon
    Taxa {
        latnames: Vec<String>,
        custom: Option<NodeTaxon>,
    },
}

impl SpaceInput {
    pub fn kind(&self) -> &'static str {
        match self {
            SpaceInput::Range { .. } => "range",
            SpaceInput::Numbers(_) => "numbers",
            SpaceInput::Hex(_) => "hex",
            SpaceInput::Text(_) => "text",
            SpaceInput::Taxa { .. } => "taxa",
        }
    }
}

/// Context available while encoding a space definition
pub struct SpaceContext<'a> {
    /// The filter's current single space, if any
    pub current: Option<&'a EncodedSpace>,
    pub taxonomy: &'a dyn TaxonomySource,
    /// Names of all configured taxonomy sources
    pub sources: &'a [String],
}

/// Type-specific capabilities of a matrix filter
pub trait MatrixFilterBehavior: Send + Sync {
    fn filter_type(&self) -> MatrixFilterType;

    fn is_multispace(&self) -> bool {
        self.filter_type().is_multispace()
    }

    fn default_definition(&self) -> FilterDefinition {
        FilterDefinition::plain()
    }

    /// JSON space of a filter that has no space defined yet
    fn get_empty_encoded_space(&self) -> Value {
        json!([])
    }

    /// Shape check of a raw JSON space
    fn validate_encoded_space(&self, space: &Value) -> bool;

    /// Typed decode of a raw JSON space, rejecting invalid shapes
    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError>;

    /// Encode the filter's space (single-space types) or one value (multispace types)
    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError>;

    /// Encode a value assigned directly to a node
    fn encode_entity_form_value(&self, _value: &Value) -> Result<EncodedSpace, BehaviorError> {
        Err(BehaviorError::NotInlineAssignable(self.filter_type()))
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String;

    /// Values a child carries for this filter, as stored in children caches
    fn node_filter_space_as_list(
        &self,
        node_space: &NodeFilterSpace,
        spaces: &BTreeMap<SpaceId, MatrixFilterSpace>,
    ) -> Vec<Value> {
        if let Some(encoded) = &node_space.encoded_space {
            return encoded.as_list();
        }

        let mut referenced: Vec<&MatrixFilterSpace> = node_space
            .values
            .iter()
            .filter_map(|id| spaces.get(id))
            .collect();
        referenced.sort_by_key(|s| (s.position, s.id));
        referenced
            .into_iter()
            .map(|s| s.encoded_space.to_value())
            .collect()
    }
}

static RANGE: RangeFilterBehavior = RangeFilterBehavior;
static NUMBER: NumberFilterBehavior = NumberFilterBehavior;
static COLOR: ColorFilterBehavior = ColorFilterBehavior;
static DESCRIPTIVE: DescriptiveTextAndImagesFilterBehavior = DescriptiveTextAndImagesFilterBehavior;
static TEXT_ONLY: TextOnlyFilterBehavior = TextOnlyFilterBehavior;
static TAXON: TaxonFilterBehavior = TaxonFilterBehavior;

/// The behavior implementing `filter_type`
pub fn behavior_for(filter_type: MatrixFilterType) -> &'static dyn MatrixFilterBehavior {
    match filter_type {
        MatrixFilterType::Range => &RANGE,
        MatrixFilterType::Number => &NUMBER,
        MatrixFilterType::Color => &COLOR,
        MatrixFilterType::DescriptiveTextAndImages => &DESCRIPTIVE,
        MatrixFilterType::TextOnly => &TEXT_ONLY,
        MatrixFilterType::Taxon => &TAXON,
    }
}

/// Finite JSON number as f64
pub(crate) fn as_finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}
