//! Storage abstraction
//!
//! Every service reads and writes through a [`StoreTransaction`] obtained
//! from a [`HierarchyStore`]. A transaction sees its own writes, and either
//! every write it made becomes visible on [`StoreTransaction::commit`] or
//! none does: dropping an uncommitted transaction rolls it back.
//!
//! Backends maintain three lookups the engine relies on:
//!
//! - children by parent id, for fan-out checks and child listings
//! - descendants by ancestor id (the path index), for subtree queries
//! - employee assets by `(company_id, employee_id)`, which is unique
//!
//! The last one is the guard that keeps an employee bound to at most one
//! node: a second insert for the same key fails with
//! [`StoreError::UniqueViolation`].

use async_trait::async_trait;
use hierarchy_model::{Asset, Entity, EntityDefinition};
use thiserror::Error;
use uuid::Uuid;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryHierarchyStore;

/// Storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A unique index already holds the key
    #[error("Unique index {index} already contains {key}")]
    UniqueViolation {
        /// Index name
        index: String,
        /// Conflicting key
        key: String,
    },

    /// A transaction could not be started in time
    #[error("Store busy: {0}")]
    Busy(String),

    /// Backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A source of transactions.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Start a transaction.
    ///
    /// Waits for conflicting transactions to finish; fails with
    /// [`StoreError::Busy`] when the backend's wait bound is exceeded.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// One unit of work against the store.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    // Definitions

    /// Get a definition by id.
    async fn get_definition(&self, id: Uuid) -> StoreResult<Option<EntityDefinition>>;

    /// Get the definition listed under a template key.
    async fn find_template(&self, key: &str) -> StoreResult<Option<EntityDefinition>>;

    /// All definitions, oldest first.
    async fn list_definitions(&self) -> StoreResult<Vec<EntityDefinition>>;

    /// Insert or replace a definition. Template keys are unique.
    async fn put_definition(&mut self, definition: EntityDefinition) -> StoreResult<()>;

    // Entities

    /// Get an entity by id.
    async fn get_entity(&self, id: Uuid) -> StoreResult<Option<Entity>>;

    /// Direct children of `parent_id`, oldest first, optionally of one type.
    async fn children(&self, parent_id: Uuid, entity_type: Option<&str>) -> StoreResult<Vec<Entity>>;

    /// Number of direct children of `parent_id`.
    async fn count_children(&self, parent_id: Uuid) -> StoreResult<usize>;

    /// Every entity whose path contains `ancestor_id`, shallowest first.
    async fn descendants(&self, ancestor_id: Uuid) -> StoreResult<Vec<Entity>>;

    /// Every entity of a company, shallowest first.
    async fn company_entities(&self, company_id: Uuid) -> StoreResult<Vec<Entity>>;

    /// Insert or replace an entity, keeping the indexes in step.
    async fn put_entity(&mut self, entity: Entity) -> StoreResult<()>;

    /// Remove an entity. Returns it when it existed.
    async fn delete_entity(&mut self, id: Uuid) -> StoreResult<Option<Entity>>;

    // Assets

    /// Get an asset by id.
    async fn get_asset(&self, id: Uuid) -> StoreResult<Option<Asset>>;

    /// Assets bound to any of `entity_ids`, optionally of one type.
    async fn assets_for_entities(
        &self,
        entity_ids: &[Uuid],
        asset_type: Option<&str>,
    ) -> StoreResult<Vec<Asset>>;

    /// The employee asset for `(company_id, employee_id)`.
    async fn find_employee_asset(&self, company_id: Uuid, employee_id: &str) -> StoreResult<Option<Asset>>;

    /// Insert a new asset.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when the id exists or an
    /// employee asset already holds the same `(company_id, employee_id)`.
    async fn insert_asset(&mut self, asset: Asset) -> StoreResult<()>;

    /// Remove an asset. Returns it when it existed.
    async fn delete_asset(&mut self, id: Uuid) -> StoreResult<Option<Asset>>;

    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
