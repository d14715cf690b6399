use configs::{StorageConfig, StorageMode};
use models::{AnyEntity, EntityKind, ForeignKey, Persisted, Target};
use tracing::info;

use crate::db::DbStorage;
use crate::engine::{ObjectMap, StorageEngine};
use crate::error::StorageResult;
use crate::file::FileStorage;

/// The one storage handle callers use. Picks its backend from the
/// configured mode once, then forwards every operation unchanged.
pub struct Storage {
    engine: Box<dyn StorageEngine>,
}

impl Storage {
    /// Build the configured backend and load it (`reload`) right away.
    pub async fn open(config: &StorageConfig) -> StorageResult<Self> {
        let engine: Box<dyn StorageEngine> = match config.mode {
            StorageMode::File => Box::new(FileStorage::new(config.file.path.clone())),
            StorageMode::Db => Box::new(DbStorage::new(config.database.clone())),
        };
        let storage = Self::with_engine(engine).await?;
        info!(event = "storage_open", mode = ?config.mode, "storage ready");
        Ok(storage)
    }

    /// Wrap an already-built engine and load it.
    pub async fn with_engine(mut engine: Box<dyn StorageEngine>) -> StorageResult<Self> {
        engine.reload().await?;
        Ok(Self { engine })
    }

    pub fn mode(&self) -> StorageMode {
        self.engine.mode()
    }

    pub async fn all(&self, kind: Option<EntityKind>) -> StorageResult<ObjectMap> {
        self.engine.all(kind).await
    }

    pub async fn new(&mut self, entity: impl Into<AnyEntity>) -> StorageResult<()> {
        self.engine.new(entity.into()).await
    }

    pub async fn save(&mut self) -> StorageResult<()> {
        self.engine.save().await
    }

    pub async fn delete(&mut self, target: impl Into<Target>) -> StorageResult<()> {
        self.engine.delete(target.into()).await
    }

    pub async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<AnyEntity>> {
        self.engine.get(kind, id).await
    }

    pub async fn count(&self, kind: Option<EntityKind>) -> StorageResult<u64> {
        self.engine.count(kind).await
    }

    pub async fn reload(&mut self) -> StorageResult<()> {
        self.engine.reload().await
    }

    pub async fn close(&mut self) -> StorageResult<()> {
        self.engine.close().await
    }

    pub async fn all_by(&self, fk: ForeignKey, parent_id: &str) -> StorageResult<Vec<AnyEntity>> {
        self.engine.all_by(fk, parent_id).await
    }

    pub async fn amenities_of(&self, place_id: &str) -> StorageResult<Vec<AnyEntity>> {
        self.engine.amenities_of(place_id).await
    }

    pub async fn get_as<T: Persisted>(&self, id: &str) -> StorageResult<Option<T>> {
        Ok(self.get(T::KIND, id).await?.and_then(T::from_any))
    }

    /// Every entity of `T`, in key order.
    pub async fn all_of<T: Persisted>(&self) -> StorageResult<Vec<T>> {
        let objects = self.all(Some(T::KIND)).await?;
        Ok(objects.into_values().filter_map(T::from_any).collect())
    }
}
