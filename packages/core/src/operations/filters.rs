//! Matrix filter, filter space and node assignment operations
//!
//! Range, Number and Taxon filters own at most one space row, which is the
//! filter's space and is set with [`GuideTransaction::set_filter_space`]. Color,
//! DescriptiveTextAndImages and TextOnly filters own one row per declared value.
//! A child's values for a filter live in its [`NodeFilterSpace`].

use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    normalize_text, FilterSpaceParams, GuideTransaction, MatrixFilterParams, MatrixFilterUpdate,
    NodeSpaceAssignment,
};
use crate::behaviors::{behavior_for, SpaceContext, SpaceInput};
use crate::db::DomainEvent;
use crate::models::{
    check_length, EncodedSpace, MatrixFilter, MatrixFilterSpace, MatrixFilterType, NodeFilterSpace,
    NodeId, SpaceId, ValidationError, DEFAULT_WEIGHT,
};
use crate::services::KeyServiceError;

fn check_weight(weight: u8) -> Result<(), ValidationError> {
    if weight > 100 {
        return Err(ValidationError::InvalidWeight(weight));
    }
    Ok(())
}

impl<'a> GuideTransaction<'a> {
    fn check_filter_name(&self, node_id: NodeId, name: &str, own: Option<&Uuid>) -> Result<(), KeyServiceError> {
        if name.is_empty() {
            return Err(ValidationError::missing_field("name").into());
        }
        check_length("name", name, self.config.text_limits.matrix_filter_name)?;
        let taken = self
            .state
            .filters_of(node_id)
            .iter()
            .any(|f| Some(&f.uuid) != own && f.name == name);
        if taken {
            return Err(ValidationError::DuplicateName(name.to_string()).into());
        }
        Ok(())
    }

    fn encode_space(
        &self,
        filter: &MatrixFilter,
        input: &SpaceInput,
        current: Option<&EncodedSpace>,
    ) -> Result<EncodedSpace, KeyServiceError> {
        let ctx = SpaceContext {
            current,
            taxonomy: self.taxonomy,
            sources: &self.config.taxonomy_sources,
        };
        Ok(behavior_for(filter.filter_type).encode_space_from_form(input, &ctx)?)
    }

    fn check_space_texts(
        &self,
        filter_type: MatrixFilterType,
        encoded: &EncodedSpace,
        description: Option<&str>,
    ) -> Result<(), KeyServiceError> {
        let limits = &self.config.text_limits;
        if let EncodedSpace::Text(text) = encoded {
            match filter_type {
                MatrixFilterType::DescriptiveTextAndImages => {
                    check_length("text", text, limits.descriptive_text)?
                }
                MatrixFilterType::TextOnly => check_length("text", text, limits.text_only_text)?,
                _ => {}
            }
        }
        if let Some(description) = description {
            check_length("description", description, limits.color_description)?;
        }
        Ok(())
    }

    fn reject_duplicate_space(
        &self,
        filter: &MatrixFilter,
        encoded: &EncodedSpace,
        own: Option<SpaceId>,
    ) -> Result<(), KeyServiceError> {
        let duplicate = self
            .state
            .spaces_of(&filter.uuid)
            .iter()
            .any(|s| Some(s.id) != own && &s.encoded_space == encoded);
        if duplicate {
            return Err(ValidationError::invalid_definition(format!(
                "{} already declares {}",
                filter.name,
                behavior_for(filter.filter_type).decode_for_display(encoded)
            ))
            .into());
        }
        Ok(())
    }

    // ---- matrix filters -----------------------------------------------------

    /// Attach a new filter to `params.node_id`
    pub fn create_matrix_filter(&mut self, params: MatrixFilterParams) -> Result<MatrixFilter, KeyServiceError> {
        let node = self.node(params.node_id)?;
        if !self.node_type_of(&node).can_have_children() {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "result node {} has no children to filter",
                node.id
            )));
        }

        let name = params.name.trim().to_string();
        self.check_filter_name(node.id, &name, None)?;

        let behavior = behavior_for(params.filter_type);
        let definition = params
            .definition
            .unwrap_or_else(|| behavior.default_definition());
        definition.validate_for(params.filter_type)?;

        let weight = params.weight.unwrap_or(DEFAULT_WEIGHT);
        check_weight(weight)?;

        let position = params
            .position
            .unwrap_or(self.state.filters_of(node.id).len() as u32 + 1);
        let mut filter = MatrixFilter::new(node.id, params.filter_type, name, definition, position);
        filter.description = normalize_text(params.description);
        filter.weight = weight;

        self.state.matrix_filters.insert(filter.uuid, filter.clone());
        self.cache().add_matrix_filter(&filter);

        info!(uuid = %filter.uuid, node_id = node.id, filter_type = %filter.filter_type, "Created matrix filter");
        self.emit(DomainEvent::MatrixFilterCreated {
            uuid: filter.uuid,
            node_id: node.id,
        });
        Ok(filter)
    }

    pub fn update_matrix_filter(
        &mut self,
        uuid: &Uuid,
        update: MatrixFilterUpdate,
    ) -> Result<MatrixFilter, KeyServiceError> {
        let mut filter = self.matrix_filter(uuid)?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            self.check_filter_name(filter.node_id, &name, Some(uuid))?;
            filter.name = name;
        }
        if let Some(description) = update.description {
            filter.description = normalize_text(description);
        }
        if let Some(definition) = update.definition {
            definition.validate_for(filter.filter_type)?;
            filter.definition = definition;
        }
        if let Some(weight) = update.weight {
            check_weight(weight)?;
            filter.weight = weight;
        }
        if let Some(position) = update.position {
            filter.position = position;
        }

        self.state.matrix_filters.insert(filter.uuid, filter.clone());
        self.emit(DomainEvent::MatrixFilterUpdated { uuid: filter.uuid });
        Ok(filter)
    }

    /// Delete a filter with its spaces and node assignments
    ///
    /// Children keep their cached values for the filter until the next rebuild.
    pub fn delete_matrix_filter(&mut self, uuid: &Uuid) -> Result<MatrixFilter, KeyServiceError> {
        let filter = self.matrix_filter(uuid)?;

        self.state.matrix_filters.remove(uuid);
        self.state
            .filter_spaces
            .retain(|_, space| &space.matrix_filter_uuid != uuid);
        self.state
            .node_filter_spaces
            .retain(|_, nfs| &nfs.matrix_filter_uuid != uuid);
        self.cache().remove_matrix_filter(&filter);

        info!(uuid = %filter.uuid, node_id = filter.node_id, "Deleted matrix filter");
        self.emit(DomainEvent::MatrixFilterDeleted { uuid: filter.uuid });
        Ok(filter)
    }

    // ---- filter spaces ------------------------------------------------------

    /// Define the space of a Range, Number or Taxon filter
    pub fn set_filter_space(&mut self, uuid: &Uuid, input: &SpaceInput) -> Result<MatrixFilterSpace, KeyServiceError> {
        let filter = self.matrix_filter(uuid)?;
        if filter.filter_type.is_multispace() {
            return Err(ValidationError::invalid_definition(format!(
                "{} declares one space per value",
                filter.filter_type
            ))
            .into());
        }

        let existing = self.state.spaces_of(uuid).first().map(|s| (*s).clone());
        let encoded = self.encode_space(&filter, input, existing.as_ref().map(|s| &s.encoded_space))?;

        let space = match existing {
            Some(mut space) => {
                space.encoded_space = encoded;
                space
            }
            None => MatrixFilterSpace {
                id: self.state.sequences.next_filter_space(),
                matrix_filter_uuid: filter.uuid,
                encoded_space: encoded,
                image_url: None,
                description: None,
                gradient: false,
                position: 1,
            },
        };
        self.state.filter_spaces.insert(space.id, space.clone());

        debug!(uuid = %filter.uuid, space_id = space.id, "Set filter space");
        self.emit(DomainEvent::FilterSpaceChanged {
            filter_uuid: filter.uuid,
            space_id: space.id,
        });
        Ok(space)
    }

    /// Declare one more value of a Color, DescriptiveTextAndImages or TextOnly filter
    pub fn add_filter_space(
        &mut self,
        uuid: &Uuid,
        params: FilterSpaceParams,
    ) -> Result<MatrixFilterSpace, KeyServiceError> {
        let filter = self.matrix_filter(uuid)?;
        if !filter.filter_type.is_multispace() {
            return Err(ValidationError::invalid_definition(format!(
                "{} has a single space, set it instead",
                filter.filter_type
            ))
            .into());
        }

        let encoded = self.encode_space(&filter, &params.input, None)?;
        let description = normalize_text(params.description);
        self.check_space_texts(filter.filter_type, &encoded, description.as_deref())?;
        self.reject_duplicate_space(&filter, &encoded, None)?;

        let space = MatrixFilterSpace {
            id: self.state.sequences.next_filter_space(),
            matrix_filter_uuid: filter.uuid,
            encoded_space: encoded,
            image_url: params.image_url,
            description,
            gradient: params.gradient,
            position: self.state.spaces_of(uuid).len() as u32 + 1,
        };
        self.state.filter_spaces.insert(space.id, space.clone());

        debug!(uuid = %filter.uuid, space_id = space.id, "Added filter space");
        self.emit(DomainEvent::FilterSpaceChanged {
            filter_uuid: filter.uuid,
            space_id: space.id,
        });
        Ok(space)
    }

    /// Edit a declared value; children carrying it follow the new value
    pub fn update_filter_space(
        &mut self,
        space_id: SpaceId,
        params: FilterSpaceParams,
    ) -> Result<MatrixFilterSpace, KeyServiceError> {
        let mut space = self.filter_space(space_id)?;
        let filter = self.matrix_filter(&space.matrix_filter_uuid)?;
        if !filter.filter_type.is_multispace() {
            return Err(ValidationError::invalid_definition(format!(
                "{} has a single space, set it instead",
                filter.filter_type
            ))
            .into());
        }

        let encoded = self.encode_space(&filter, &params.input, None)?;
        let description = normalize_text(params.description);
        self.check_space_texts(filter.filter_type, &encoded, description.as_deref())?;
        self.reject_duplicate_space(&filter, &encoded, Some(space_id))?;

        let old_value = space.encoded_space.to_value();
        let new_value = encoded.to_value();
        space.encoded_space = encoded;
        space.image_url = params.image_url;
        space.description = description;
        space.gradient = params.gradient;
        self.state.filter_spaces.insert(space.id, space.clone());

        if old_value != new_value {
            self.cache()
                .update_matrix_filter_space(&filter.uuid, &old_value, &new_value);
        }

        self.emit(DomainEvent::FilterSpaceChanged {
            filter_uuid: filter.uuid,
            space_id,
        });
        Ok(space)
    }

    /// Delete a declared value and drop it from every assignment
    ///
    /// Assignments left without any value are deleted.
    pub fn remove_filter_space(&mut self, space_id: SpaceId) -> Result<MatrixFilterSpace, KeyServiceError> {
        let space = self.filter_space(space_id)?;
        let filter = self.matrix_filter(&space.matrix_filter_uuid)?;

        let mut emptied = Vec::new();
        for nfs in self.state.node_filter_spaces.values_mut() {
            if nfs.matrix_filter_uuid == filter.uuid && nfs.values.remove(&space_id) && nfs.values.is_empty() {
                emptied.push((nfs.id, nfs.node_id));
            }
        }
        for (nfs_id, _) in &emptied {
            self.state.node_filter_spaces.remove(nfs_id);
        }

        let mut cache = self.cache();
        cache.remove_matrix_filter_space(&space);
        for (_, node_id) in &emptied {
            cache.add_or_update_child(filter.node_id, *node_id);
        }
        self.state.filter_spaces.remove(&space_id);

        debug!(uuid = %filter.uuid, space_id, "Removed filter space");
        self.emit(DomainEvent::FilterSpaceChanged {
            filter_uuid: filter.uuid,
            space_id,
        });
        for (_, node_id) in emptied {
            self.emit(DomainEvent::NodeFilterSpaceChanged {
                node_id,
                filter_uuid: filter.uuid,
            });
        }
        Ok(space)
    }

    // ---- node assignments ---------------------------------------------------

    /// Set the value(s) `node_id` carries for a filter of its parent
    pub fn assign_node_filter_space(
        &mut self,
        node_id: NodeId,
        uuid: &Uuid,
        assignment: NodeSpaceAssignment,
    ) -> Result<NodeFilterSpace, KeyServiceError> {
        let filter = self.matrix_filter(uuid)?;
        let node = self.node(node_id)?;

        if self.state.effective_child(filter.node_id, node.id).is_none() {
            return Err(KeyServiceError::hierarchy_violation(format!(
                "node {} is not a child of node {} which owns filter {}",
                node.id, filter.node_id, filter.name
            )));
        }
        if filter.filter_type == MatrixFilterType::Taxon {
            return Err(ValidationError::invalid_assignment(
                "TaxonFilter values follow from the node taxon",
            )
            .into());
        }

        let (encoded_space, values) = match assignment {
            NodeSpaceAssignment::Inline(value) if filter.filter_type.uses_inline_assignment() => (
                Some(behavior_for(filter.filter_type).encode_entity_form_value(&value)?),
                BTreeSet::new(),
            ),
            NodeSpaceAssignment::Inline(_) => {
                return Err(ValidationError::invalid_assignment(format!(
                    "{} node space does not support encoded_space, use values instead",
                    filter.filter_type
                ))
                .into())
            }
            NodeSpaceAssignment::Values(ids) => {
                for id in &ids {
                    let space = self.filter_space(*id)?;
                    if space.matrix_filter_uuid != filter.uuid {
                        return Err(ValidationError::invalid_assignment(format!(
                            "space {} does not belong to filter {}",
                            id, filter.name
                        ))
                        .into());
                    }
                }
                let values: BTreeSet<SpaceId> = ids.into_iter().collect();
                if values.len() > 1 && !filter.definition.allow_multiple_values {
                    return Err(ValidationError::invalid_assignment(format!(
                        "{} accepts a single value",
                        filter.name
                    ))
                    .into());
                }
                (None, values)
            }
        };

        let existing = self.state.node_filter_space(node.id, uuid).cloned();
        let nfs = NodeFilterSpace {
            id: match &existing {
                Some(nfs) => nfs.id,
                None => self.state.sequences.next_node_filter_space(),
            },
            node_id: node.id,
            matrix_filter_uuid: filter.uuid,
            encoded_space,
            values,
            weight: existing.map_or(DEFAULT_WEIGHT, |nfs| nfs.weight),
        };
        nfs.check_shape(filter.filter_type)?;

        self.state.node_filter_spaces.insert(nfs.id, nfs.clone());
        self.cache().add_or_update_child(filter.node_id, node.id);

        debug!(node_id = node.id, uuid = %filter.uuid, "Assigned node filter space");
        self.emit(DomainEvent::NodeFilterSpaceChanged {
            node_id: node.id,
            filter_uuid: filter.uuid,
        });
        Ok(nfs)
    }

    /// Clear the value(s) of `node_id` for a filter, returns whether any existed
    pub fn remove_node_filter_space(&mut self, node_id: NodeId, uuid: &Uuid) -> Result<bool, KeyServiceError> {
        let filter = self.matrix_filter(uuid)?;
        let Some(nfs_id) = self.state.node_filter_space(node_id, uuid).map(|nfs| nfs.id) else {
            return Ok(false);
        };

        self.state.node_filter_spaces.remove(&nfs_id);
        self.cache().add_or_update_child(filter.node_id, node_id);

        self.emit(DomainEvent::NodeFilterSpaceChanged {
            node_id,
            filter_uuid: filter.uuid,
        });
        Ok(true)
    }
}
