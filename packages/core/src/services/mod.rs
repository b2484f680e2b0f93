//! Business Services
//!
//! This module contains the guide's business logic:
//!
//! - `NatureGuideService` - units of work over one guide, events and reads
//! - `CrosslinkManager` - cycle detection over crosslink nuid pairs
//! - `ChildrenCacheManager` - named maintenance operations of the per-parent caches
//! - `GuideQueries` - taxa, traits, crosslink maps and localization lookups
//! - `ReleaseBuilder` - JSON export for the identification app
//!
//! Services coordinate between the storage layer and the operations,
//! enforcing the tree rules before anything is committed.

pub mod children_cache;
pub mod crosslink_manager;
pub mod error;
pub mod guide_service;
pub mod queries;
pub mod release;

pub use children_cache::ChildrenCacheManager;
pub use crosslink_manager::CrosslinkManager;
pub use error::KeyServiceError;
pub use guide_service::NatureGuideService;
pub use queries::{GuideQueries, NodeTrait};
pub use release::{build_release_json, drifted_parents, ReleaseBuilder};
