//! NatureKey Core Identification Matrix Layer
//!
//! This crate provides the data model, tree addressing, filter encodings and cache
//! maintenance behind a polytomous (matrix-style) identification key.
//!
//! # Architecture
//!
//! - **Nuid Tree**: Nodes are addressed by fixed-width base-36 segments, so ancestry is a prefix test
//! - **Crosslinks**: Extra parent→child edges over the same node set, kept free of cycles
//! - **Typed Matrix Filters**: Range, Number, Color, DescriptiveTextAndImages, TextOnly and Taxon
//! - **Children Caches**: One denormalized document per parent, patched on every mutation
//!
//! # Modules
//!
//! - [`config`] - Guide configuration (identity, text limits, taxonomy sources)
//! - [`models`] - Data structures (TreeNode, Crosslink, MatrixFilter, ChildrenCache, etc.)
//! - [`behaviors`] - Matrix filter type registry and per-type encoders
//! - [`operations`] - Parameter types and the unit-of-work mutations
//! - [`services`] - NatureGuideService, crosslink checks and cache management
//! - [`db`] - Nuid addressing, guide state and snapshot persistence

pub mod behaviors;
pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use behaviors::*;
pub use config::GuideConfig;
pub use models::*;
pub use services::*;
