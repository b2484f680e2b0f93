//! Guide configuration
//!
//! A guide is configured once when its service is opened: identity, the text
//! limits enforced on authoring input and the taxonomy sources used to resolve
//! taxon filters.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default capacity of the domain event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Taxon source used for nodes that act as their own taxon
pub const GUIDE_TAXON_SOURCE: &str = "app_kit.features.nature_guides";

/// Maximum character counts for authored text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLengthLimits {
    pub meta_node_name: usize,
    pub decision_rule: usize,
    pub matrix_filter_name: usize,
    /// Text of one DescriptiveTextAndImages space
    pub descriptive_text: usize,
    /// Text of one TextOnly space
    pub text_only_text: usize,
    pub color_description: usize,
}

impl Default for TextLengthLimits {
    fn default() -> Self {
        Self {
            meta_node_name: 40,
            decision_rule: 40,
            matrix_filter_name: 150,
            descriptive_text: 100,
            text_only_text: 200,
            color_description: 40,
        }
    }
}

/// Configuration for one identification guide
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideConfig {
    /// Numeric guide id, encoded into the root nuid
    pub guide_id: u64,

    /// Display name, also used as the name of the root node
    pub guide_name: String,

    pub text_limits: TextLengthLimits,

    /// Taxonomy sources searched when resolving taxon filter entries
    pub taxonomy_sources: Vec<String>,

    /// Taxon source for result nodes without an assigned taxon
    pub guide_taxon_source: String,

    /// Broadcast channel capacity for domain events
    pub event_channel_capacity: usize,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            guide_id: 1,
            guide_name: "Nature Guide".to_string(),
            text_limits: TextLengthLimits::default(),
            taxonomy_sources: vec!["taxonomy.sources.col".to_string()],
            guide_taxon_source: GUIDE_TAXON_SOURCE.to_string(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl GuideConfig {
    /// Create a config for the given guide with default limits
    pub fn new(guide_id: u64, guide_name: impl Into<String>) -> Self {
        Self {
            guide_id,
            guide_name: guide_name.into(),
            ..Self::default()
        }
    }

    /// Load a config from a JSON file, missing fields fall back to defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| format!("invalid config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.guide_name.trim().is_empty() {
            return Err("guide_name cannot be empty".to_string());
        }

        if self.guide_name.chars().count() > self.text_limits.meta_node_name {
            return Err(format!(
                "guide_name cannot exceed {} characters",
                self.text_limits.meta_node_name
            ));
        }

        // 36^3 ids fit into one nuid segment
        if self.guide_id >= 36u64.pow(3) {
            return Err("guide_id does not fit into a single nuid segment".to_string());
        }

        if self.taxonomy_sources.iter().any(|s| s.trim().is_empty()) {
            return Err("taxonomy_sources cannot contain empty names".to_string());
        }

        if self.guide_taxon_source.trim().is_empty() {
            return Err("guide_taxon_source cannot be empty".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }

        let limits = &self.text_limits;
        if [
            limits.meta_node_name,
            limits.decision_rule,
            limits.matrix_filter_name,
            limits.descriptive_text,
            limits.text_only_text,
            limits.color_description,
        ]
        .contains(&0)
        {
            return Err("text limits must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GuideConfig::default();
        assert_eq!(config.guide_id, 1);
        assert_eq!(config.text_limits.meta_node_name, 40);
        assert_eq!(config.text_limits.matrix_filter_name, 150);
        assert_eq!(config.text_limits.text_only_text, 200);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = GuideConfig::new(7, "Pond life");
        assert!(config.validate().is_ok());

        config.guide_name = "  ".to_string();
        assert!(config.validate().is_err());

        config.guide_name = "Pond life".to_string();
        config.guide_id = 36 * 36 * 36;
        assert!(config.validate().is_err());

        config.guide_id = 7;
        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());

        config.event_channel_capacity = 16;
        config.text_limits.decision_rule = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"guide_id": 12, "guide_name": "Trees"}}"#).unwrap();

        let config = GuideConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.guide_id, 12);
        assert_eq!(config.guide_name, "Trees");
        assert_eq!(config.text_limits, TextLengthLimits::default());
        assert_eq!(config.guide_taxon_source, GUIDE_TAXON_SOURCE);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"guide_name": ""}}"#).unwrap();
        assert!(GuideConfig::from_json_file(file.path()).is_err());
    }
}
