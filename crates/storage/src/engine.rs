use std::collections::BTreeMap;

use async_trait::async_trait;
use configs::StorageMode;
use models::{AnyEntity, EntityKind, ForeignKey, Target};

use crate::error::StorageResult;

/// Result of `all`: composite key `Kind.id` to entity.
pub type ObjectMap = BTreeMap<String, AnyEntity>;

/// The operation set shared by every backend.
///
/// Not-found is never an error: `get` yields `None`, `delete` of an absent
/// entity succeeds, `count`/`all` on an empty store yield zero/empty.
/// Mutating calls take `&mut self`, so a handle is driven by one caller.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    fn mode(&self) -> StorageMode;

    /// Every entity, or only those of `kind`.
    async fn all(&self, kind: Option<EntityKind>) -> StorageResult<ObjectMap>;

    /// Register (insert or replace) an entity. Durable after `save`.
    async fn new(&mut self, entity: AnyEntity) -> StorageResult<()>;

    /// Make everything registered or deleted since the last save durable.
    async fn save(&mut self) -> StorageResult<()>;

    async fn delete(&mut self, target: Target) -> StorageResult<()>;

    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<AnyEntity>>;

    async fn count(&self, kind: Option<EntityKind>) -> StorageResult<u64>;

    /// Refresh from the durable store. The relational engine discards
    /// unsaved work; the file engine replaces its index with the document,
    /// and leaves it as is when no document exists yet.
    async fn reload(&mut self) -> StorageResult<()>;

    /// End the current interaction. `reload` starts a new one.
    async fn close(&mut self) -> StorageResult<()>;

    /// Children of `parent_id` along `fk`, in id order.
    async fn all_by(&self, fk: ForeignKey, parent_id: &str) -> StorageResult<Vec<AnyEntity>>;

    /// Amenities linked to a place, in id order. Dangling links are skipped.
    async fn amenities_of(&self, place_id: &str) -> StorageResult<Vec<AnyEntity>>;
}
