//! Storage Layer
//!
//! This module holds everything below the service layer:
//!
//! - Nuid arithmetic for tree addressing
//! - The in-memory relational state of a guide and its read queries
//! - Snapshot persistence (in-memory and JSON file stores)
//! - Domain events emitted after committed mutations
//!
//! # Architecture
//!
//! A guide is small enough to be held in memory as one [`GuideState`]. Every
//! mutation produces a new snapshot which is persisted as a whole, so there is
//! no partial-write state to recover from.

mod error;
pub mod events;
pub mod nuid;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use events::DomainEvent;
pub use nuid::{NuidError, NuidManager, NUID_BLOCK_WIDTH};
pub use state::{EffectiveChild, GuideState, IdSequences};
pub use store::{GuideStore, JsonFileStore, MemoryStore};
