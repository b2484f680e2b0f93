//! Taxon filter
//!
//! A taxon filter narrows children by higher taxa. Its single space is a list of
//! entries, each naming a higher taxon (`latname`, possibly comma separated) and
//! the taxa it resolved to in every configured taxonomy source. Children are not
//! assigned values; their space is derived from their own taxon.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{BehaviorError, MatrixFilterBehavior, SpaceContext, SpaceInput};
use crate::models::{
    EncodedSpace, MatrixFilterSpace, MatrixFilterType, NodeFilterSpace, NodeTaxon, SpaceId,
    TaxonFilterEntry,
};

/// Predefined higher-taxon shortcuts: (latname, label)
pub const PREDEFINED_TAXONOMIC_FILTERS: [(&str, &str); 16] = [
    ("Animalia", "Animals"),
    ("Plantae", "Plants"),
    ("Fungi", "Mushrooms"),
    ("Chordata", "Chordates"),
    ("Mammalia", "Mammals"),
    ("Aves", "Birds"),
    ("Amphibia", "Amphibians"),
    ("Anura", "Frogs"),
    (
        "Holocephali,Elasmobranchii,Sarcopterygii,Actinopterygii",
        "Fish",
    ),
    ("Arthropoda", "Arthropods"),
    ("Insecta", "Insects"),
    ("Lepidoptera", "Butterflies"),
    ("Coleoptera", "Bugs"),
    ("Odonata", "Dragonflies and damselflies"),
    ("Arachnida", "Spiders"),
    ("Mollusca", "Molluscs"),
];

pub fn is_predefined(latname: &str) -> bool {
    PREDEFINED_TAXONOMIC_FILTERS
        .iter()
        .any(|(name, _)| *name == latname)
}

/// Lookup of taxa by latin name within named sources
pub trait TaxonomySource: Send + Sync {
    fn find_by_latname(&self, source: &str, latname: &str) -> Option<NodeTaxon>;
}

/// In-memory taxonomy, keyed by source and latname
#[derive(Debug, Clone, Default)]
pub struct StaticTaxonomySource {
    taxa: BTreeMap<(String, String), NodeTaxon>,
}

impl StaticTaxonomySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_taxa(taxa: impl IntoIterator<Item = NodeTaxon>) -> Self {
        let mut source = Self::default();
        for taxon in taxa {
            source.insert(taxon);
        }
        source
    }

    /// First taxon per (source, latname) wins
    pub fn insert(&mut self, taxon: NodeTaxon) {
        self.taxa
            .entry((taxon.taxon_source.clone(), taxon.taxon_latname.clone()))
            .or_insert(taxon);
    }
}

impl TaxonomySource for StaticTaxonomySource {
    fn find_by_latname(&self, source: &str, latname: &str) -> Option<NodeTaxon> {
        self.taxa
            .get(&(source.to_string(), latname.to_string()))
            .cloned()
    }
}

pub struct TaxonFilterBehavior;

impl TaxonFilterBehavior {
    /// Resolve `latname` (comma separated parts allowed) in `sources`
    pub fn make_taxonfilter_entry(
        latname: &str,
        sources: &[String],
        taxonomy: &dyn TaxonomySource,
    ) -> TaxonFilterEntry {
        let mut entry = TaxonFilterEntry {
            latname: latname.to_string(),
            taxa: Vec::new(),
            is_custom: !is_predefined(latname),
        };

        for source in sources {
            for part in latname.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                if let Some(taxon) = taxonomy.find_by_latname(source, part) {
                    if !entry.taxa.contains(&taxon) {
                        entry.taxa.push(taxon);
                    }
                }
            }
        }

        entry
    }

    /// Entries of `space` that contain `taxon`, as shipped JSON
    pub fn space_for_node(space: &EncodedSpace, taxon: Option<&NodeTaxon>) -> Vec<Value> {
        let (EncodedSpace::Taxa(entries), Some(taxon)) = (space, taxon) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|entry| entry.matches(taxon))
            .map(|entry| json!(entry))
            .collect()
    }

    fn check_entry(entry: &Value) -> Result<(), String> {
        let object = entry
            .as_object()
            .ok_or_else(|| format!("taxon filter entry must be an object, got {}", entry))?;

        if !object.get("latname").is_some_and(Value::is_string) {
            return Err("entry requires a string latname".to_string());
        }
        if !object.get("is_custom").is_some_and(Value::is_boolean) {
            return Err("entry requires a boolean is_custom".to_string());
        }
        let taxa = object
            .get("taxa")
            .and_then(Value::as_array)
            .ok_or_else(|| "entry requires a taxa list".to_string())?;

        for taxon in taxa {
            let taxon = taxon
                .as_object()
                .ok_or_else(|| format!("taxon must be an object, got {}", taxon))?;
            for key in ["taxon_source", "taxon_latname", "name_uuid", "taxon_nuid"] {
                if !taxon.get(key).is_some_and(Value::is_string) {
                    return Err(format!("taxon requires a string {}", key));
                }
            }
            // the author may be null but must be present
            match taxon.get("taxon_author") {
                Some(Value::Null) | Some(Value::String(_)) => {}
                _ => return Err("taxon requires taxon_author (string or null)".to_string()),
            }
        }

        Ok(())
    }
}

impl MatrixFilterBehavior for TaxonFilterBehavior {
    fn filter_type(&self) -> MatrixFilterType {
        MatrixFilterType::Taxon
    }

    fn validate_encoded_space(&self, space: &Value) -> bool {
        match space.as_array() {
            Some(entries) => entries.iter().all(|e| Self::check_entry(e).is_ok()),
            None => false,
        }
    }

    fn parse_encoded_space(&self, space: &Value) -> Result<EncodedSpace, BehaviorError> {
        let entries = space.as_array().ok_or_else(|| {
            BehaviorError::invalid(MatrixFilterType::Taxon, "expected a list of entries")
        })?;
        for entry in entries {
            Self::check_entry(entry)
                .map_err(|reason| BehaviorError::invalid(MatrixFilterType::Taxon, reason))?;
        }
        serde_json::from_value(space.clone())
            .map(EncodedSpace::Taxa)
            .map_err(|e| BehaviorError::invalid(MatrixFilterType::Taxon, e.to_string()))
    }

    fn encode_space_from_form(
        &self,
        input: &SpaceInput,
        ctx: &SpaceContext<'_>,
    ) -> Result<EncodedSpace, BehaviorError> {
        let SpaceInput::Taxa { latnames, custom } = input else {
            return Err(BehaviorError::UnsupportedInput {
                filter_type: MatrixFilterType::Taxon,
                input: input.kind(),
            });
        };

        let existing: &[TaxonFilterEntry] = match ctx.current {
            Some(EncodedSpace::Taxa(entries)) => entries,
            _ => &[],
        };

        let mut entries = Vec::new();
        for latname in latnames {
            if is_predefined(latname) {
                entries.push(Self::make_taxonfilter_entry(
                    latname,
                    ctx.sources,
                    ctx.taxonomy,
                ));
            } else {
                // custom entries keep their resolution from the current space
                entries.extend(
                    existing
                        .iter()
                        .filter(|e| e.is_custom && &e.latname == latname)
                        .cloned(),
                );
            }
        }

        if let Some(custom) = custom {
            let remaining: Vec<String> = ctx
                .sources
                .iter()
                .filter(|s| **s != custom.taxon_source)
                .cloned()
                .collect();
            let mut entry =
                Self::make_taxonfilter_entry(&custom.taxon_latname, &remaining, ctx.taxonomy);
            if !entry.taxa.contains(custom) {
                entry.taxa.push(custom.clone());
            }
            entry.is_custom = true;
            entries.push(entry);
        }

        Ok(EncodedSpace::Taxa(entries))
    }

    fn decode_for_display(&self, space: &EncodedSpace) -> String {
        match space {
            EncodedSpace::Taxa(entries) => entries
                .iter()
                .map(|e| e.latname.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_value().to_string(),
        }
    }

    fn node_filter_space_as_list(
        &self,
        _node_space: &NodeFilterSpace,
        _spaces: &BTreeMap<SpaceId, MatrixFilterSpace>,
    ) -> Vec<Value> {
        Vec::new()
    }
}
