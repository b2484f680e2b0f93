//! Nature Guide Service
//!
//! The entry point for authoring one identification guide:
//!
//! - Tree editing (insert, update, reorder, move, delete)
//! - Crosslinks between existing nodes
//! - Matrix filters, their spaces and per-child assignments
//! - Children cache rebuilds, guide queries and release export
//!
//! # Units of work
//!
//! Every mutating method is one unit of work. It takes the write lock, runs the
//! operation on a clone of the committed [`GuideState`], saves the clone through
//! the [`GuideStore`] and only then swaps it in. Domain events collected by the
//! operation are broadcast after the swap, so subscribers never observe a change
//! that was not persisted. Use [`NatureGuideService::commit`] to group several
//! operations into one unit of work.
//!
//! Reads take the read lock and return owned copies.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::behaviors::{behavior_for, SpaceInput, StaticTaxonomySource, TaxonomySource};
use crate::config::GuideConfig;
use crate::db::{DomainEvent, GuideState, GuideStore, MemoryStore, StoreError};
use crate::models::{
    CacheItem, ChildrenCache, Crosslink, CrosslinkId, MatrixFilter, MatrixFilterSpace, MetaNode,
    NodeFilterSpace, NodeId, NodeTaxon, SpaceId, TreeNode,
};
use crate::operations::{
    CrosslinkParams, FilterSpaceParams, GuideTransaction, InsertNodeParams, MatrixFilterParams,
    MatrixFilterUpdate, NodeSpaceAssignment, NodeUpdate,
};
use crate::services::{build_release_json, ChildrenCacheManager, GuideQueries, KeyServiceError, NodeTrait};

/// Authoring service for one guide
#[derive(Clone)]
pub struct NatureGuideService {
    /// Committed state, replaced as a whole by each unit of work
    state: Arc<RwLock<GuideState>>,

    store: Arc<dyn GuideStore>,

    /// Resolves taxon filter entries
    taxonomy: Arc<dyn TaxonomySource>,

    config: Arc<GuideConfig>,

    /// Broadcast channel for domain events
    event_tx: broadcast::Sender<DomainEvent>,
}

impl NatureGuideService {
    /// Open the guide held by `store`, creating its root if the store is empty
    ///
    /// # Errors
    ///
    /// `InitializationError` for an invalid config, `Store` if the snapshot
    /// cannot be read or belongs to another guide.
    pub async fn open(
        config: GuideConfig,
        store: Arc<dyn GuideStore>,
        taxonomy: Arc<dyn TaxonomySource>,
    ) -> Result<Self, KeyServiceError> {
        config
            .validate()
            .map_err(KeyServiceError::initialization_error)?;

        let mut state = match store.load().await? {
            Some(state) if state.guide_id != config.guide_id => {
                return Err(StoreError::GuideMismatch {
                    expected: config.guide_id,
                    found: state.guide_id,
                }
                .into());
            }
            Some(state) => state,
            None => GuideState::new(config.guide_id, config.guide_name.clone()),
        };

        if state.root().is_none() {
            {
                let mut tx = GuideTransaction::new(&mut state, &config, taxonomy.as_ref());
                tx.create_root()?;
            }
            store.save(&state).await?;
            info!(guide_id = config.guide_id, "Initialized new guide");
        }

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            store,
            taxonomy,
            config: Arc::new(config),
            event_tx,
        })
    }

    /// Open a fresh guide kept in memory, without taxonomy sources
    pub async fn in_memory(config: GuideConfig) -> Result<Self, KeyServiceError> {
        Self::open(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(StaticTaxonomySource::new()),
        )
        .await
    }

    pub fn config(&self) -> &GuideConfig {
        &self.config
    }

    /// Subscribe to domain events
    ///
    /// Events arrive in commit order, after the change was persisted.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a domain event to all subscribers
    ///
    /// Ignores errors if no subscribers (expected in some tests).
    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run `op` as one unit of work
    ///
    /// Nothing is committed, saved or emitted if `op` or the save fails.
    pub async fn commit<T, F>(&self, op: F) -> Result<T, KeyServiceError>
    where
        T: Send,
        F: FnOnce(&mut GuideTransaction<'_>) -> Result<T, KeyServiceError> + Send,
    {
        let mut committed = self.state.write().await;
        let mut working = committed.clone();

        let (value, events) = {
            let mut tx = GuideTransaction::new(&mut working, &self.config, self.taxonomy.as_ref());
            let value = op(&mut tx)?;
            (value, tx.into_events())
        };

        self.store.save(&working).await?;
        *committed = working;
        drop(committed);

        debug!(events = events.len(), "Committed unit of work");
        for event in events {
            self.emit_event(event);
        }
        Ok(value)
    }

    // ---- tree ----------------------------------------------------------------

    pub async fn insert_node(&self, params: InsertNodeParams) -> Result<TreeNode, KeyServiceError> {
        self.commit(|tx| tx.insert_node(params)).await
    }

    pub async fn update_node(&self, id: NodeId, update: NodeUpdate) -> Result<TreeNode, KeyServiceError> {
        self.commit(|tx| tx.update_node(id, update)).await
    }

    /// Assign positions 1..n to the effective children of `parent_id`
    pub async fn reorder_children(&self, parent_id: NodeId, ordered: Vec<NodeId>) -> Result<(), KeyServiceError> {
        self.commit(|tx| tx.reorder_children(parent_id, &ordered)).await
    }

    /// Move a node and its subtree below `new_parent_id`
    pub async fn move_node(&self, id: NodeId, new_parent_id: NodeId) -> Result<TreeNode, KeyServiceError> {
        self.commit(|tx| tx.move_node(id, new_parent_id)).await
    }

    /// Delete a leaf node
    pub async fn delete_node(&self, id: NodeId) -> Result<(), KeyServiceError> {
        self.commit(|tx| tx.delete_node(id)).await
    }

    /// Delete a node with its whole subtree, returns the deleted ids in order
    pub async fn delete_branch(&self, id: NodeId) -> Result<Vec<NodeId>, KeyServiceError> {
        self.commit(|tx| tx.delete_branch(id)).await
    }

    // ---- crosslinks ------------------------------------------------------------

    pub async fn add_crosslink(&self, parent_id: NodeId, params: CrosslinkParams) -> Result<Crosslink, KeyServiceError> {
        self.commit(|tx| tx.add_crosslink(parent_id, params)).await
    }

    pub async fn add_crosslinks(
        &self,
        parent_id: NodeId,
        batch: Vec<CrosslinkParams>,
    ) -> Result<Vec<Crosslink>, KeyServiceError> {
        self.commit(|tx| tx.add_crosslinks(parent_id, batch)).await
    }

    pub async fn remove_crosslink(&self, id: CrosslinkId) -> Result<Crosslink, KeyServiceError> {
        self.commit(|tx| tx.remove_crosslink(id)).await
    }

    // ---- matrix filters ----------------------------------------------------------

    pub async fn create_matrix_filter(&self, params: MatrixFilterParams) -> Result<MatrixFilter, KeyServiceError> {
        self.commit(|tx| tx.create_matrix_filter(params)).await
    }

    pub async fn update_matrix_filter(
        &self,
        uuid: Uuid,
        update: MatrixFilterUpdate,
    ) -> Result<MatrixFilter, KeyServiceError> {
        self.commit(|tx| tx.update_matrix_filter(&uuid, update)).await
    }

    pub async fn delete_matrix_filter(&self, uuid: Uuid) -> Result<MatrixFilter, KeyServiceError> {
        self.commit(|tx| tx.delete_matrix_filter(&uuid)).await
    }

    /// Define the space of a single-space filter (Range, Number, Taxon)
    pub async fn set_filter_space(&self, uuid: Uuid, input: SpaceInput) -> Result<MatrixFilterSpace, KeyServiceError> {
        self.commit(|tx| tx.set_filter_space(&uuid, &input)).await
    }

    /// Declare one more value of a multispace filter
    pub async fn add_filter_space(
        &self,
        uuid: Uuid,
        params: FilterSpaceParams,
    ) -> Result<MatrixFilterSpace, KeyServiceError> {
        self.commit(|tx| tx.add_filter_space(&uuid, params)).await
    }

    pub async fn update_filter_space(
        &self,
        space_id: SpaceId,
        params: FilterSpaceParams,
    ) -> Result<MatrixFilterSpace, KeyServiceError> {
        self.commit(|tx| tx.update_filter_space(space_id, params)).await
    }

    pub async fn remove_filter_space(&self, space_id: SpaceId) -> Result<MatrixFilterSpace, KeyServiceError> {
        self.commit(|tx| tx.remove_filter_space(space_id)).await
    }

    /// Set what a child of the filter's node carries for the filter
    pub async fn assign_node_filter_space(
        &self,
        node_id: NodeId,
        uuid: Uuid,
        assignment: NodeSpaceAssignment,
    ) -> Result<NodeFilterSpace, KeyServiceError> {
        self.commit(|tx| tx.assign_node_filter_space(node_id, &uuid, assignment))
            .await
    }

    /// Clear a child's assignment, returns whether one existed
    pub async fn remove_node_filter_space(&self, node_id: NodeId, uuid: Uuid) -> Result<bool, KeyServiceError> {
        self.commit(|tx| tx.remove_node_filter_space(node_id, &uuid)).await
    }

    // ---- children caches ---------------------------------------------------------

    /// Recompute one parent's cache, returns whether it had drifted
    pub async fn rebuild_children_cache(&self, parent_id: NodeId) -> Result<bool, KeyServiceError> {
        self.commit(|tx| tx.rebuild_children_cache(parent_id)).await
    }

    /// Recompute every cache, returns the parents whose cache had drifted
    pub async fn rebuild_all_children_caches(&self) -> Result<Vec<NodeId>, KeyServiceError> {
        self.commit(|tx| Ok(tx.rebuild_all_children_caches())).await
    }

    /// Cache document of `parent_id` as currently stored
    pub async fn children_cache(&self, parent_id: NodeId) -> Option<ChildrenCache> {
        self.state.read().await.children_cache(parent_id).cloned()
    }

    /// Cache document of `parent_id` as computed from relational state
    pub async fn computed_children_cache(&self, parent_id: NodeId) -> ChildrenCache {
        ChildrenCacheManager::compute(&*self.state.read().await, parent_id)
    }

    // ---- reads -------------------------------------------------------------------

    /// Owned copy of the committed state
    pub async fn snapshot(&self) -> GuideState {
        self.state.read().await.clone()
    }

    pub async fn root(&self) -> Result<TreeNode, KeyServiceError> {
        self.state
            .read()
            .await
            .root()
            .cloned()
            .ok_or_else(|| KeyServiceError::hierarchy_violation("guide has no root node"))
    }

    pub async fn get_node(&self, id: NodeId) -> Option<TreeNode> {
        self.state.read().await.node(id).cloned()
    }

    pub async fn get_meta_node(&self, id: NodeId) -> Option<MetaNode> {
        let state = self.state.read().await;
        state.node(id).and_then(|n| state.meta_for(n)).cloned()
    }

    /// Direct tree children in position order
    pub async fn get_children(&self, id: NodeId) -> Vec<TreeNode> {
        let state = self.state.read().await;
        state.tree_children(id).into_iter().cloned().collect()
    }

    /// Every node below `id`, in nuid order
    pub async fn get_descendants(&self, id: NodeId) -> Vec<TreeNode> {
        let state = self.state.read().await;
        state.descendants(id).into_iter().cloned().collect()
    }

    /// Tree and crosslinked children as rendered below `id`
    pub async fn effective_children(&self, id: NodeId) -> Vec<CacheItem> {
        let state = self.state.read().await;
        state
            .effective_children(id)
            .iter()
            .map(|child| ChildrenCacheManager::child_as_item(&state, id, child))
            .collect()
    }

    pub async fn crosslinks(&self) -> Vec<Crosslink> {
        self.state.read().await.crosslinks.values().cloned().collect()
    }

    /// Filters owned by `node_id`, in position order
    pub async fn matrix_filters(&self, node_id: NodeId) -> Vec<MatrixFilter> {
        let state = self.state.read().await;
        state.filters_of(node_id).into_iter().cloned().collect()
    }

    pub async fn filter_spaces(&self, uuid: Uuid) -> Vec<MatrixFilterSpace> {
        let state = self.state.read().await;
        state.spaces_of(&uuid).into_iter().cloned().collect()
    }

    /// JSON space of a single-space filter, the type's empty space if undefined
    pub async fn filter_encoded_space(&self, uuid: Uuid) -> Result<Value, KeyServiceError> {
        let state = self.state.read().await;
        let filter = state
            .matrix_filter(&uuid)
            .ok_or_else(|| KeyServiceError::matrix_filter_not_found(uuid))?;
        let behavior = behavior_for(filter.filter_type);
        Ok(state
            .spaces_of(&uuid)
            .first()
            .map(|s| s.encoded_space.to_value())
            .unwrap_or_else(|| behavior.get_empty_encoded_space()))
    }

    pub async fn node_filter_space(&self, node_id: NodeId, uuid: Uuid) -> Option<NodeFilterSpace> {
        self.state.read().await.node_filter_space(node_id, &uuid).cloned()
    }

    // ---- guide queries -----------------------------------------------------------

    pub async fn crosslink_map(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.state.read().await;
        GuideQueries::new(&state, &self.config).crosslink_map()
    }

    pub async fn crosslink_candidates(&self, parent_id: NodeId) -> Vec<TreeNode> {
        let state = self.state.read().await;
        GuideQueries::new(&state, &self.config)
            .crosslink_candidates(parent_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn taxa(&self) -> Vec<NodeTaxon> {
        let state = self.state.read().await;
        GuideQueries::new(&state, &self.config).taxa()
    }

    pub async fn result_nodes_for_taxon(&self, taxon_source: &str, taxon_latname: &str) -> Vec<TreeNode> {
        let state = self.state.read().await;
        GuideQueries::new(&state, &self.config)
            .result_nodes_for_taxon(taxon_source, taxon_latname)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn collect_traits(&self, node_id: NodeId) -> Vec<NodeTrait> {
        let state = self.state.read().await;
        GuideQueries::new(&state, &self.config).collect_traits(node_id)
    }

    pub async fn primary_localization(&self) -> BTreeMap<String, String> {
        let state = self.state.read().await;
        GuideQueries::new(&state, &self.config).primary_localization()
    }

    // ---- release -----------------------------------------------------------------

    /// Rebuild every cache, then render the release document
    ///
    /// The rebuild is committed like any other unit of work.
    pub async fn build_release(&self) -> Result<Value, KeyServiceError> {
        let drifted = self.rebuild_all_children_caches().await?;
        if !drifted.is_empty() {
            info!(?drifted, "Rebuilt drifted caches before release");
        }

        let state = self.state.read().await;
        Ok(build_release_json(&state, &self.config))
    }
}
