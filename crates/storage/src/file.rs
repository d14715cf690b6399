use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use configs::StorageMode;
use models::{AnyEntity, EntityKind, ForeignKey, ObjectKey, Target};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::engine::{ObjectMap, StorageEngine};
use crate::error::{StorageError, StorageResult};

/// Whole-graph JSON document backend.
///
/// All reads are served from the in-memory index; only `save` and `reload`
/// touch the file. `save` writes a sibling temp file and renames it over the
/// document, so a failed write never leaves a truncated document behind.
pub struct FileStorage {
    path: PathBuf,
    objects: ObjectMap,
    /// Keys registered through `new` since the last successful save.
    staged: BTreeSet<String>,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), objects: ObjectMap::new(), staged: BTreeSet::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn matching(
        &self,
        kind: Option<EntityKind>,
    ) -> impl Iterator<Item = (&String, &AnyEntity)> + '_ {
        self.objects.iter().filter(move |(_, e)| kind.map_or(true, |k| e.kind() == k))
    }

    /// Drop a deleted amenity from every place that lists it.
    fn unlink_amenity(&mut self, amenity_id: &str) {
        for entity in self.objects.values_mut() {
            if let AnyEntity::Place(place) = entity {
                place.remove_amenity(amenity_id);
            }
        }
    }

    fn remove_key(&mut self, key: &ObjectKey) -> bool {
        let composite = key.to_string();
        self.staged.remove(&composite);
        let removed = self.objects.remove(&composite).is_some();
        if removed && key.kind == EntityKind::Amenity {
            self.unlink_amenity(&key.id);
        }
        removed
    }

    async fn write_document(&self, snapshot: &ObjectMap) -> StorageResult<()> {
        let mut document = Map::new();
        for (key, entity) in snapshot {
            document.insert(key.clone(), Value::Object(entity.to_document()?));
        }
        let data = serde_json::to_vec(&Value::Object(document))
            .map_err(|e| StorageError::Persistence(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| StorageError::Persistence(e.to_string()))?;
        }
        let tmp = self.temp_path();
        let written = match fs::write(&tmp, data).await {
            Ok(()) => fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // a partial write or a failed rename must not leave the temp file behind
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::Persistence(e.to_string()));
        }
        Ok(())
    }

    fn parse_document(bytes: &[u8]) -> StorageResult<ObjectMap> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ObjectMap::new());
        }
        let document: Map<String, Value> =
            serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let mut objects = ObjectMap::new();
        for (key, value) in document {
            let parsed: ObjectKey =
                key.parse().map_err(|e| StorageError::Corrupt(format!("{key}: {e}")))?;
            let Value::Object(attrs) = value else {
                return Err(StorageError::Corrupt(format!("{key}: entry is not an object")));
            };
            let entity = AnyEntity::from_mapping_as(parsed.kind, attrs)
                .map_err(|e| StorageError::Corrupt(format!("{key}: {e}")))?;
            if entity.id() != parsed.id {
                return Err(StorageError::Corrupt(format!("{key}: id does not match its key")));
            }
            objects.insert(key, entity);
        }
        Ok(objects)
    }
}

#[async_trait]
impl StorageEngine for FileStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::File
    }

    async fn all(&self, kind: Option<EntityKind>) -> StorageResult<ObjectMap> {
        Ok(self.matching(kind).map(|(k, e)| (k.clone(), e.clone())).collect())
    }

    async fn new(&mut self, entity: AnyEntity) -> StorageResult<()> {
        let key = entity.key().to_string();
        debug!(key = %key, "registered");
        self.staged.insert(key.clone());
        self.objects.insert(key, entity);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn save(&mut self) -> StorageResult<()> {
        let mut snapshot = self.objects.clone();
        for key in &self.staged {
            if let Some(entity) = snapshot.get_mut(key) {
                entity.touch();
            }
        }
        self.write_document(&snapshot).await?;
        let touched = self.staged.len();
        self.objects = snapshot;
        self.staged.clear();
        info!(
            event = "save",
            path = %self.path.display(),
            objects = self.objects.len(),
            touched,
            "document written"
        );
        Ok(())
    }

    async fn delete(&mut self, target: Target) -> StorageResult<()> {
        let removed = match target {
            Target::Key(key) => usize::from(self.remove_key(&key)),
            Target::Id(id) => EntityKind::ALL
                .into_iter()
                .filter(|kind| self.remove_key(&ObjectKey::new(*kind, id.as_str())))
                .count(),
        };
        debug!(removed, "delete");
        Ok(())
    }

    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<AnyEntity>> {
        Ok(self.objects.get(&ObjectKey::new(kind, id).to_string()).cloned())
    }

    async fn count(&self, kind: Option<EntityKind>) -> StorageResult<u64> {
        Ok(self.matching(kind).count() as u64)
    }

    #[instrument(skip(self))]
    async fn reload(&mut self) -> StorageResult<()> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no document yet");
                return Ok(());
            }
            Err(e) => return Err(StorageError::Persistence(e.to_string())),
        };
        self.objects = Self::parse_document(&bytes)?;
        self.staged.clear();
        info!(
            event = "reload",
            path = %self.path.display(),
            objects = self.objects.len(),
            "document loaded"
        );
        Ok(())
    }

    async fn close(&mut self) -> StorageResult<()> {
        debug!(event = "close", "nothing to release");
        Ok(())
    }

    async fn all_by(&self, fk: ForeignKey, parent_id: &str) -> StorageResult<Vec<AnyEntity>> {
        let mut children: Vec<AnyEntity> = self
            .matching(Some(fk.child()))
            .filter(|(_, e)| e.foreign_key(fk) == Some(parent_id))
            .map(|(_, e)| e.clone())
            .collect();
        children.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(children)
    }

    async fn amenities_of(&self, place_id: &str) -> StorageResult<Vec<AnyEntity>> {
        let place_key = ObjectKey::new(EntityKind::Place, place_id).to_string();
        let Some(AnyEntity::Place(place)) = self.objects.get(&place_key) else {
            return Ok(Vec::new());
        };
        let mut amenities: Vec<AnyEntity> = place
            .amenity_ids
            .iter()
            .map(|id| ObjectKey::new(EntityKind::Amenity, id.as_str()).to_string())
            .filter_map(|key| self.objects.get(&key))
            .cloned()
            .collect();
        amenities.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(amenities)
    }
}
