use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use configs::{DatabaseConfig, StorageMode};
use migration::{Migrator, MigratorTrait};
use models::{
    amenity, city, place, place_amenity, review, AnyEntity, EntityKind, ForeignKey, ObjectKey,
    Target,
};
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use crate::engine::{ObjectMap, StorageEngine};
use crate::error::{StorageError, StorageResult};

/// Run `$body` with `$m` bound to the model module of `$kind`.
macro_rules! for_kind {
    ($kind:expr, $m:ident => $body:expr) => {
        match $kind {
            EntityKind::State => {
                use models::state as $m;
                $body
            }
            EntityKind::City => {
                use models::city as $m;
                $body
            }
            EntityKind::User => {
                use models::user as $m;
                $body
            }
            EntityKind::Place => {
                use models::place as $m;
                $body
            }
            EntityKind::Review => {
                use models::review as $m;
                $body
            }
            EntityKind::Amenity => {
                use models::amenity as $m;
                $body
            }
        }
    };
}

/// Relational backend over sea-orm.
///
/// The pool is created on the first `reload`. Between `reload` and
/// `save`/`close` every operation runs inside one open transaction, so staged
/// writes are visible to this handle only until they are committed.
pub struct DbStorage {
    config: DatabaseConfig,
    pool: Option<DatabaseConnection>,
    session: Option<DatabaseTransaction>,
    /// Entities registered through `new` since the last save, by composite key.
    staged: BTreeMap<String, AnyEntity>,
    schema_ready: bool,
}

impl DbStorage {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config, pool: None, session: None, staged: BTreeMap::new(), schema_ready: false }
    }

    async fn pool(&mut self) -> StorageResult<DatabaseConnection> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let cfg = &self.config;
        let mut opts = ConnectOptions::new(cfg.connection_url());
        opts.max_connections(cfg.max_connections)
            .min_connections(cfg.min_connections)
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .acquire_timeout(Duration::from_secs(cfg.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(cfg.idle_timeout_secs))
            .sqlx_logging(cfg.sqlx_logging);
        let pool = Database::connect(opts)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        info!(
            event = "connect",
            backend = ?pool.get_database_backend(),
            max_connections = cfg.max_connections,
            "pool ready"
        );
        self.pool = Some(pool.clone());
        Ok(pool)
    }

    /// Create missing tables; on the first connect with `reset_schema`, drop
    /// and recreate everything instead.
    async fn ensure_schema(&mut self, pool: &DatabaseConnection) -> StorageResult<()> {
        if !self.schema_ready && self.config.reset_schema {
            warn!(event = "schema_reset", "dropping and recreating all tables");
            Migrator::fresh(pool).await.map_err(|e| StorageError::Schema(e.to_string()))?;
        } else {
            Migrator::up(pool, None).await.map_err(|e| StorageError::Schema(e.to_string()))?;
        }
        self.schema_ready = true;
        Ok(())
    }

    async fn rollback_session(&mut self) -> StorageResult<()> {
        self.staged.clear();
        if let Some(txn) = self.session.take() {
            txn.rollback().await.map_err(StorageError::query)?;
        }
        Ok(())
    }

    async fn begin_session(&mut self) -> StorageResult<()> {
        let pool = self.pool().await?;
        let txn = pool.begin().await.map_err(|e| StorageError::Connection(e.to_string()))?;
        self.session = Some(txn);
        Ok(())
    }
}

/// Re-tag a flush failure without nesting the inner error's prefix.
fn persistence(e: StorageError) -> StorageError {
    match e {
        StorageError::Query(msg) | StorageError::Persistence(msg) => StorageError::Persistence(msg),
        other => StorageError::Persistence(other.to_string()),
    }
}

fn open(session: &Option<DatabaseTransaction>) -> StorageResult<&DatabaseTransaction> {
    session.as_ref().ok_or(StorageError::SessionClosed)
}

async fn write_entity<C: ConnectionTrait>(db: &C, entity: &AnyEntity) -> StorageResult<()> {
    let written = match entity {
        AnyEntity::State(m) => models::state::upsert(db, m).await,
        AnyEntity::City(m) => models::city::upsert(db, m).await,
        AnyEntity::User(m) => models::user::upsert(db, m).await,
        AnyEntity::Place(m) => models::place::upsert(db, m).await,
        AnyEntity::Review(m) => models::review::upsert(db, m).await,
        AnyEntity::Amenity(m) => models::amenity::upsert(db, m).await,
    };
    written.map_err(StorageError::query)
}

async fn delete_row<C: ConnectionTrait>(db: &C, key: &ObjectKey) -> StorageResult<u64> {
    let id = key.id.clone();
    let links = match key.kind {
        EntityKind::Place => place_amenity::delete_for_place(db, &id).await,
        EntityKind::Amenity => place_amenity::delete_for_amenity(db, &id).await,
        _ => Ok(0),
    }
    .map_err(StorageError::query)?;
    let res = for_kind!(key.kind, m => m::Entity::delete_by_id(id).exec(db).await);
    let rows = res.map_err(StorageError::query)?.rows_affected;
    if rows > 0 || links > 0 {
        debug!(key = %key, rows, links, "deleted");
    }
    Ok(rows)
}

/// Fill `amenity_ids` of every place in `entities` from the join table.
async fn hydrate_places<C>(db: &C, entities: &mut [AnyEntity]) -> StorageResult<()>
where
    C: ConnectionTrait,
{
    let place_ids: Vec<String> = entities
        .iter()
        .filter(|e| e.kind() == EntityKind::Place)
        .map(|e| e.id().to_string())
        .collect();
    if place_ids.is_empty() {
        return Ok(());
    }
    let rows = place_amenity::Entity::find()
        .filter(place_amenity::Column::PlaceId.is_in(place_ids))
        .order_by_asc(place_amenity::Column::AmenityId)
        .all(db)
        .await
        .map_err(StorageError::query)?;
    let mut links: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        links.entry(row.place_id).or_default().push(row.amenity_id);
    }
    for entity in entities.iter_mut() {
        if let AnyEntity::Place(place) = entity {
            place.amenity_ids = links.remove(&place.id).unwrap_or_default();
        }
    }
    Ok(())
}

async fn fetch_kind<C: ConnectionTrait>(db: &C, kind: EntityKind) -> StorageResult<Vec<AnyEntity>> {
    let rows: Result<Vec<AnyEntity>, sea_orm::DbErr> = for_kind!(kind, m => m::Entity::find()
        .order_by_asc(m::Column::Id)
        .all(db)
        .await
        .map(|rows| rows.into_iter().map(AnyEntity::from).collect()));
    let mut entities = rows.map_err(StorageError::query)?;
    hydrate_places(db, &mut entities).await?;
    Ok(entities)
}

/// Commit-side half of `save`: refresh and rewrite the staged entities.
async fn flush_staged(
    txn: &DatabaseTransaction,
    staged: BTreeMap<String, AnyEntity>,
) -> StorageResult<usize> {
    let touched = staged.len();
    for (_, mut entity) in staged {
        entity.touch();
        write_entity(txn, &entity).await?;
    }
    Ok(touched)
}

#[async_trait]
impl StorageEngine for DbStorage {
    fn mode(&self) -> StorageMode {
        StorageMode::Db
    }

    async fn all(&self, kind: Option<EntityKind>) -> StorageResult<ObjectMap> {
        let txn = open(&self.session)?;
        let kinds = kind.map(|k| vec![k]).unwrap_or_else(|| EntityKind::ALL.to_vec());
        let mut objects = ObjectMap::new();
        for kind in kinds {
            for entity in fetch_kind(txn, kind).await? {
                objects.insert(entity.key().to_string(), entity);
            }
        }
        Ok(objects)
    }

    async fn new(&mut self, entity: AnyEntity) -> StorageResult<()> {
        let txn = open(&self.session)?;
        write_entity(txn, &entity).await?;
        let key = entity.key().to_string();
        debug!(key = %key, "staged");
        self.staged.insert(key, entity);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn save(&mut self) -> StorageResult<()> {
        let txn = self.session.take().ok_or(StorageError::SessionClosed)?;
        let staged = std::mem::take(&mut self.staged);

        let outcome = match flush_staged(&txn, staged).await {
            Ok(touched) => txn
                .commit()
                .await
                .map(|_| touched)
                .map_err(|e| StorageError::Persistence(e.to_string())),
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    warn!(error = %rb, "rollback after failed flush");
                }
                Err(persistence(e))
            }
        };

        // The commit outcome is what the caller gets. A failed reopen leaves
        // the handle without a session, so the next call reports SessionClosed.
        if let Err(e) = self.begin_session().await {
            warn!(event = "session_reopen_failed", error = %e, "no session after save");
        }
        let touched = outcome?;
        info!(event = "save", touched, "transaction committed");
        Ok(())
    }

    async fn delete(&mut self, target: Target) -> StorageResult<()> {
        let txn = open(&self.session)?;
        let keys: Vec<ObjectKey> = match target {
            Target::Key(key) => vec![key],
            Target::Id(id) => EntityKind::ALL
                .into_iter()
                .map(|k| ObjectKey::new(k, id.as_str()))
                .collect(),
        };
        for key in keys {
            delete_row(txn, &key).await?;
            self.staged.remove(&key.to_string());
            if key.kind == EntityKind::Amenity {
                // keep the next flush from re-linking it
                for entity in self.staged.values_mut() {
                    if let AnyEntity::Place(place) = entity {
                        place.remove_amenity(&key.id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<AnyEntity>> {
        let txn = open(&self.session)?;
        let found = for_kind!(kind, m => m::Entity::find_by_id(id.to_string())
            .one(txn)
            .await
            .map(|row| row.map(AnyEntity::from)));
        let Some(entity) = found.map_err(StorageError::query)? else {
            return Ok(None);
        };
        let mut one = [entity];
        hydrate_places(txn, &mut one).await?;
        let [entity] = one;
        Ok(Some(entity))
    }

    async fn count(&self, kind: Option<EntityKind>) -> StorageResult<u64> {
        let txn = open(&self.session)?;
        let kinds = kind.map(|k| vec![k]).unwrap_or_else(|| EntityKind::ALL.to_vec());
        let mut total = 0;
        for kind in kinds {
            let n = for_kind!(kind, m => m::Entity::find().count(txn).await);
            total += n.map_err(StorageError::query)?;
        }
        Ok(total)
    }

    #[instrument(skip(self))]
    async fn reload(&mut self) -> StorageResult<()> {
        let pool = self.pool().await?;
        self.rollback_session().await?;
        self.ensure_schema(&pool).await?;
        self.begin_session().await?;
        info!(event = "reload", "session opened");
        Ok(())
    }

    async fn close(&mut self) -> StorageResult<()> {
        let discarded = self.staged.len();
        self.rollback_session().await?;
        info!(event = "close", discarded, "session closed");
        Ok(())
    }

    async fn all_by(&self, fk: ForeignKey, parent_id: &str) -> StorageResult<Vec<AnyEntity>> {
        let txn = open(&self.session)?;
        let parent = parent_id.to_string();
        let rows: Result<Vec<AnyEntity>, sea_orm::DbErr> = match fk {
            ForeignKey::CityState => city::Entity::find()
                .filter(city::Column::StateId.eq(parent))
                .order_by_asc(city::Column::Id)
                .all(txn)
                .await
                .map(|r| r.into_iter().map(AnyEntity::from).collect()),
            ForeignKey::PlaceCity => place::Entity::find()
                .filter(place::Column::CityId.eq(parent))
                .order_by_asc(place::Column::Id)
                .all(txn)
                .await
                .map(|r| r.into_iter().map(AnyEntity::from).collect()),
            ForeignKey::PlaceUser => place::Entity::find()
                .filter(place::Column::UserId.eq(parent))
                .order_by_asc(place::Column::Id)
                .all(txn)
                .await
                .map(|r| r.into_iter().map(AnyEntity::from).collect()),
            ForeignKey::ReviewPlace => review::Entity::find()
                .filter(review::Column::PlaceId.eq(parent))
                .order_by_asc(review::Column::Id)
                .all(txn)
                .await
                .map(|r| r.into_iter().map(AnyEntity::from).collect()),
            ForeignKey::ReviewUser => review::Entity::find()
                .filter(review::Column::UserId.eq(parent))
                .order_by_asc(review::Column::Id)
                .all(txn)
                .await
                .map(|r| r.into_iter().map(AnyEntity::from).collect()),
        };
        let mut children = rows.map_err(StorageError::query)?;
        hydrate_places(txn, &mut children).await?;
        Ok(children)
    }

    async fn amenities_of(&self, place_id: &str) -> StorageResult<Vec<AnyEntity>> {
        let txn = open(&self.session)?;
        let ids = place_amenity::amenity_ids_for(txn, place_id).await.map_err(StorageError::query)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = amenity::Entity::find()
            .filter(amenity::Column::Id.is_in(ids))
            .order_by_asc(amenity::Column::Id)
            .all(txn)
            .await
            .map_err(StorageError::query)?;
        Ok(rows.into_iter().map(AnyEntity::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{remove_sqlite, sqlite_config};
    use models::{state, user};

    #[tokio::test]
    async fn operations_before_reload_report_closed_session() -> Result<(), anyhow::Error> {
        let (cfg, path) = sqlite_config("db_closed");
        let mut store = DbStorage::new(cfg);
        assert!(matches!(store.count(None).await, Err(StorageError::SessionClosed)));
        let staged = store.new(state::Model::new("Ohio").into()).await;
        assert!(matches!(staged, Err(StorageError::SessionClosed)));
        assert!(matches!(store.save().await, Err(StorageError::SessionClosed)));
        remove_sqlite(&path);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connection_error() -> Result<(), anyhow::Error> {
        let mut cfg = DatabaseConfig::default();
        cfg.url = "sqlite:///nonexistent-dir/hbnb/none.db?mode=ro".into();
        cfg.connect_timeout_secs = 1;
        cfg.acquire_timeout_secs = 1;
        let mut store = DbStorage::new(cfg);
        assert!(matches!(store.reload().await, Err(StorageError::Connection(_))));
        Ok(())
    }

    #[tokio::test]
    async fn failed_flush_rolls_back_everything() -> Result<(), anyhow::Error> {
        let (cfg, path) = sqlite_config("db_flush_fail");
        let mut store = DbStorage::new(cfg);
        store.reload().await?;

        // the re-upsert in save hits the conflict path, which fires UPDATE triggers
        let raw = store.pool.clone().expect("pool after reload");
        raw.execute_unprepared(
            "CREATE TRIGGER reject_state_update BEFORE UPDATE ON states \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .await?;

        store.new(state::Model::new("Ohio").into()).await?;
        store.new(state::Model::new("Iowa").into()).await?;
        let err = store.save().await.unwrap_err();
        assert!(matches!(err, StorageError::Persistence(_)), "got {err:?}");
        assert!(!err.to_string().contains("query failed"), "nested prefix: {err}");
        assert_eq!(store.count(Some(EntityKind::State)).await?, 0);

        store.close().await?;
        remove_sqlite(&path);
        Ok(())
    }

    #[tokio::test]
    async fn committed_save_survives_failed_reopen() -> Result<(), anyhow::Error> {
        let (cfg, path) = sqlite_config("db_reopen_fail");
        let mut store = DbStorage::new(cfg.clone());
        store.reload().await?;
        let nevada = state::Model::new("Nevada");
        store.new(nevada.clone().into()).await?;

        // the open transaction keeps its own connection; only the reopen sees this
        store.pool = Some(DatabaseConnection::Disconnected);
        store.save().await?;
        assert!(matches!(store.count(None).await, Err(StorageError::SessionClosed)));

        let mut other = DbStorage::new(cfg);
        other.reload().await?;
        assert!(other.get(EntityKind::State, &nevada.id).await?.is_some());

        other.close().await?;
        remove_sqlite(&path);
        Ok(())
    }

    #[tokio::test]
    async fn close_discards_uncommitted_work() -> Result<(), anyhow::Error> {
        let (cfg, path) = sqlite_config("db_close");
        let mut store = DbStorage::new(cfg);
        store.reload().await?;
        store.new(state::Model::new("Idaho").into()).await?;
        assert_eq!(store.count(Some(EntityKind::State)).await?, 1);

        store.close().await?;
        store.reload().await?;
        assert_eq!(store.count(None).await?, 0);

        store.close().await?;
        remove_sqlite(&path);
        Ok(())
    }

    #[tokio::test]
    async fn save_refreshes_staged_timestamps_only() -> Result<(), anyhow::Error> {
        let (cfg, path) = sqlite_config("db_touch");
        let mut store = DbStorage::new(cfg);
        store.reload().await?;

        let u = user::Model::new("a@b.com", "pw").unwrap();
        store.new(u.clone().into()).await?;
        store.save().await?;
        let first = store.get(EntityKind::User, &u.id).await?.unwrap();
        assert!(first.updated_at() > u.updated_at);
        assert_eq!(first.created_at(), u.created_at);

        store.save().await?;
        let second = store.get(EntityKind::User, &u.id).await?.unwrap();
        assert_eq!(second.updated_at(), first.updated_at());

        store.close().await?;
        remove_sqlite(&path);
        Ok(())
    }

    #[tokio::test]
    async fn join_rows_follow_place_and_amenity_deletes() -> Result<(), anyhow::Error> {
        let (cfg, path) = sqlite_config("db_links");
        let mut store = DbStorage::new(cfg);
        store.reload().await?;

        let wifi = amenity::Model::new("Wifi");
        let pool_amenity = amenity::Model::new("Pool");
        let mut loft = place::Model::new("Loft", "city-1", "user-1");
        loft.add_amenity(&wifi.id);
        loft.add_amenity(&pool_amenity.id);
        store.new(wifi.clone().into()).await?;
        store.new(pool_amenity.clone().into()).await?;
        store.new(loft.clone().into()).await?;
        store.save().await?;
        assert_eq!(store.amenities_of(&loft.id).await?.len(), 2);

        store.delete(Target::from(&wifi)).await?;
        store.save().await?;
        let Some(AnyEntity::Place(p)) = store.get(EntityKind::Place, &loft.id).await? else {
            panic!("place missing");
        };
        assert_eq!(p.amenity_ids, vec![pool_amenity.id.clone()]);

        store.delete(Target::from(loft.id.as_str())).await?;
        store.save().await?;
        assert!(store.amenities_of(&loft.id).await?.is_empty());
        assert_eq!(store.count(Some(EntityKind::Amenity)).await?, 1);

        store.close().await?;
        remove_sqlite(&path);
        Ok(())
    }
}
