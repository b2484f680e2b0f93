//! Matrix Filter Data Structures
//!
//! A [`MatrixFilter`] is a discriminating trait owned by one parent node. Its
//! legal values are [`MatrixFilterSpace`] rows, and the value(s) a child carries
//! for it are stored in a [`NodeFilterSpace`].
//!
//! Definitions and encoded spaces are typed per filter kind instead of being
//! free-form JSON; [`EncodedSpace::to_value`] renders the JSON shape consumers
//! expect (`[min,max]`, `[n1,n2,..]`, `[r,g,b,a]`, a string, or taxon entries).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::node::{NodeId, NodeTaxon, ValidationError};

pub type SpaceId = u64;
pub type NodeFilterSpaceId = u64;

/// Default weight of filters and assignments (0-100)
pub const DEFAULT_WEIGHT: u8 = 50;

/// The closed set of filter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatrixFilterType {
    #[serde(rename = "ColorFilter")]
    Color,
    #[serde(rename = "RangeFilter")]
    Range,
    #[serde(rename = "NumberFilter")]
    Number,
    #[serde(rename = "DescriptiveTextAndImagesFilter")]
    DescriptiveTextAndImages,
    #[serde(rename = "TaxonFilter")]
    Taxon,
    #[serde(rename = "TextOnlyFilter")]
    TextOnly,
}

impl MatrixFilterType {
    pub const ALL: [MatrixFilterType; 6] = [
        MatrixFilterType::Color,
        MatrixFilterType::Range,
        MatrixFilterType::Number,
        MatrixFilterType::DescriptiveTextAndImages,
        MatrixFilterType::Taxon,
        MatrixFilterType::TextOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixFilterType::Color => "ColorFilter",
            MatrixFilterType::Range => "RangeFilter",
            MatrixFilterType::Number => "NumberFilter",
            MatrixFilterType::DescriptiveTextAndImages => "DescriptiveTextAndImagesFilter",
            MatrixFilterType::Taxon => "TaxonFilter",
            MatrixFilterType::TextOnly => "TextOnlyFilter",
        }
    }

    /// Multispace filters own one space row per declared value
    pub fn is_multispace(&self) -> bool {
        matches!(
            self,
            MatrixFilterType::Color
                | MatrixFilterType::DescriptiveTextAndImages
                | MatrixFilterType::TextOnly
        )
    }

    /// Range and Number assignments carry their value inline
    pub fn uses_inline_assignment(&self) -> bool {
        matches!(self, MatrixFilterType::Range | MatrixFilterType::Number)
    }
}

impl fmt::Display for MatrixFilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatrixFilterType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidFilterType(s.to_string()))
    }
}

/// Type-specific definition parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterParameters {
    Range {
        step: f64,
        unit: String,
        unit_verbose: String,
    },
    Number {
        unit: String,
        unit_verbose: String,
    },
    Plain,
}

/// Filter definition: multi-value selection plus type parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    #[serde(default)]
    pub allow_multiple_values: bool,
    pub parameters: FilterParameters,
}

impl FilterDefinition {
    pub fn plain() -> Self {
        Self {
            allow_multiple_values: false,
            parameters: FilterParameters::Plain,
        }
    }

    /// Check that the parameters belong to `filter_type`
    pub fn validate_for(&self, filter_type: MatrixFilterType) -> Result<(), ValidationError> {
        match (&self.parameters, filter_type) {
            (FilterParameters::Range { step, .. }, MatrixFilterType::Range) => {
                if !step.is_finite() || *step <= 0.0 {
                    return Err(ValidationError::invalid_definition(
                        "range step must be a positive number",
                    ));
                }
                Ok(())
            }
            (FilterParameters::Number { .. }, MatrixFilterType::Number) => Ok(()),
            (FilterParameters::Plain, t) if !t.uses_inline_assignment() => Ok(()),
            (params, t) => Err(ValidationError::invalid_definition(format!(
                "{:?} parameters do not apply to {}",
                params, t
            ))),
        }
    }

    /// Flat JSON form: `{allow_multiple_values, step, unit, unit_verbose}`
    pub fn to_value(&self) -> Value {
        let mut value = json!({ "allow_multiple_values": self.allow_multiple_values });
        match &self.parameters {
            FilterParameters::Range {
                step,
                unit,
                unit_verbose,
            } => {
                value["step"] = json!(step);
                value["unit"] = json!(unit);
                value["unit_verbose"] = json!(unit_verbose);
            }
            FilterParameters::Number { unit, unit_verbose } => {
                value["unit"] = json!(unit);
                value["unit_verbose"] = json!(unit_verbose);
            }
            FilterParameters::Plain => {}
        }
        value
    }
}

/// An RGBA color, alpha in `0..=1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_value(&self) -> Value {
        json!([self.r, self.g, self.b, self.a])
    }
}

/// One entry of a taxon filter: a named higher taxon resolved in several sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonFilterEntry {
    pub latname: String,
    pub taxa: Vec<NodeTaxon>,
    pub is_custom: bool,
}

impl TaxonFilterEntry {
    /// True if `taxon` lies within any of the resolved taxa
    pub fn matches(&self, taxon: &NodeTaxon) -> bool {
        self.taxa.iter().any(|t| taxon.is_within(t))
    }
}

/// Typed encoded space, one variant per value shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EncodedSpace {
    Range { min: f64, max: f64 },
    Numbers(Vec<f64>),
    Color(Rgba),
    Text(String),
    Taxa(Vec<TaxonFilterEntry>),
}

impl EncodedSpace {
    /// The JSON shape shipped to consumers
    pub fn to_value(&self) -> Value {
        match self {
            EncodedSpace::Range { min, max } => json!([min, max]),
            EncodedSpace::Numbers(numbers) => json!(numbers),
            EncodedSpace::Color(rgba) => rgba.to_value(),
            EncodedSpace::Text(text) => json!(text),
            EncodedSpace::Taxa(entries) => json!(entries),
        }
    }

    /// Values of an inline assignment as a flat list
    ///
    /// Ranges become `[min, max]`, number sets their members. Single values are
    /// wrapped in a one-element list.
    pub fn as_list(&self) -> Vec<Value> {
        match self {
            EncodedSpace::Range { min, max } => vec![json!(min), json!(max)],
            EncodedSpace::Numbers(numbers) => numbers.iter().map(|n| json!(n)).collect(),
            EncodedSpace::Taxa(entries) => entries.iter().map(|e| json!(e)).collect(),
            other => vec![other.to_value()],
        }
    }

    /// True if this variant is the shape used by `filter_type`
    pub fn fits(&self, filter_type: MatrixFilterType) -> bool {
        matches!(
            (self, filter_type),
            (EncodedSpace::Range { .. }, MatrixFilterType::Range)
                | (EncodedSpace::Numbers(_), MatrixFilterType::Number)
                | (EncodedSpace::Color(_), MatrixFilterType::Color)
                | (EncodedSpace::Text(_), MatrixFilterType::DescriptiveTextAndImages)
                | (EncodedSpace::Text(_), MatrixFilterType::TextOnly)
                | (EncodedSpace::Taxa(_), MatrixFilterType::Taxon)
        )
    }
}

/// A discriminating trait owned by one parent node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixFilter {
    pub uuid: Uuid,

    /// The parent whose children this filter discriminates
    pub node_id: NodeId,

    pub filter_type: MatrixFilterType,
    pub name: String,
    pub description: Option<String>,
    pub definition: FilterDefinition,
    pub position: u32,

    /// How discriminative the trait is, 0-100
    pub weight: u8,
}

impl MatrixFilter {
    pub fn new(
        node_id: NodeId,
        filter_type: MatrixFilterType,
        name: impl Into<String>,
        definition: FilterDefinition,
        position: u32,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            node_id,
            filter_type,
            name: name.into(),
            description: None,
            definition,
            position,
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn uuid_key(&self) -> String {
        self.uuid.to_string()
    }
}

/// One declared value of a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixFilterSpace {
    pub id: SpaceId,
    pub matrix_filter_uuid: Uuid,
    pub encoded_space: EncodedSpace,
    pub image_url: Option<String>,

    /// Color name or similar shown next to the value
    pub description: Option<String>,

    /// Color spaces only: render as gradient
    #[serde(default)]
    pub gradient: bool,

    pub position: u32,
}

/// Value(s) one child node carries for one filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFilterSpace {
    pub id: NodeFilterSpaceId,
    pub node_id: NodeId,
    pub matrix_filter_uuid: Uuid,

    /// Inline value, Range and Number filters only
    pub encoded_space: Option<EncodedSpace>,

    /// Referenced filter spaces, multispace filters only
    pub values: BTreeSet<SpaceId>,

    pub weight: u8,
}

impl NodeFilterSpace {
    /// Enforce the inline-vs-reference rule for `filter_type`
    pub fn check_shape(&self, filter_type: MatrixFilterType) -> Result<(), ValidationError> {
        if filter_type == MatrixFilterType::Taxon {
            return Err(ValidationError::invalid_assignment(
                "TaxonFilter node spaces are derived from node taxa",
            ));
        }

        if filter_type.uses_inline_assignment() {
            match &self.encoded_space {
                None => {
                    return Err(ValidationError::invalid_assignment(format!(
                        "{} node space requires encoded_space to be set",
                        filter_type
                    )))
                }
                Some(space) if !space.fits(filter_type) => {
                    return Err(ValidationError::invalid_assignment(format!(
                        "encoded_space does not match {}",
                        filter_type
                    )))
                }
                Some(_) => {}
            }
            if !self.values.is_empty() {
                return Err(ValidationError::invalid_assignment(format!(
                    "{} node space does not support values",
                    filter_type
                )));
            }
        } else {
            if self.encoded_space.is_some() {
                return Err(ValidationError::invalid_assignment(format!(
                    "{} node space does not support encoded_space, use values instead",
                    filter_type
                )));
            }
            if self.values.is_empty() {
                return Err(ValidationError::invalid_assignment(format!(
                    "{} node space requires at least one value",
                    filter_type
                )));
            }
        }

        Ok(())
    }
}
