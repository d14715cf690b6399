//! Behaviour every backend must share, run through the facade against a
//! temp JSON document and a temp SQLite database.

use std::path::PathBuf;

use configs::{DatabaseConfig, StorageConfig, StorageMode};
use models::{amenity, city, place, review, state, user, AnyEntity, EntityKind, ForeignKey, Persisted, Target};
use storage::Storage;
use uuid::Uuid;

struct Fixture {
    name: &'static str,
    config: StorageConfig,
    path: PathBuf,
}

impl Fixture {
    fn file(prefix: &str) -> Self {
        let path = std::env::temp_dir().join(format!("hbnb_it_{}_{}.json", prefix, Uuid::new_v4()));
        let mut config = StorageConfig { mode: StorageMode::File, ..StorageConfig::default() };
        config.file.path = path.clone();
        Self { name: "file", config, path }
    }

    fn sqlite(prefix: &str) -> Self {
        let path = std::env::temp_dir().join(format!("hbnb_it_{}_{}.db", prefix, Uuid::new_v4()));
        let database = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 4,
            ..DatabaseConfig::default()
        };
        let config = StorageConfig { mode: StorageMode::Db, database, ..StorageConfig::default() };
        Self { name: "db", config, path }
    }

    fn both(prefix: &str) -> [Fixture; 2] {
        [Fixture::file(prefix), Fixture::sqlite(prefix)]
    }

    async fn open(&self) -> Result<Storage, anyhow::Error> {
        Ok(Storage::open(&self.config).await?)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        for suffix in ["-wal", "-shm"] {
            let mut companion = self.path.as_os_str().to_os_string();
            companion.push(suffix);
            let _ = std::fs::remove_file(companion);
        }
    }
}

/// One entity of every kind, wired together.
fn sample_graph() -> Vec<AnyEntity> {
    let ca = state::Model::new("California");
    let sf = city::Model::new("San Francisco", &ca.id);
    let owner = user::Model::new("owner@hbnb.io", "pwd").unwrap().with_name("Betty", "Holberton");
    let wifi = amenity::Model::new("Wifi");
    let mut loft = place::Model::new("Loft", &sf.id, &owner.id);
    loft.description = Some("Sunny".into());
    loft.number_rooms = 2;
    loft.price_by_night = 120;
    loft.latitude = Some(37.7749);
    loft.longitude = Some(-122.4194);
    loft.add_amenity(&wifi.id);
    let note = review::Model::new("Great stay", &loft.id, &owner.id);
    vec![ca.into(), sf.into(), owner.into(), wifi.into(), loft.into(), note.into()]
}

#[tokio::test]
async fn new_save_get_returns_the_same_entity() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("roundtrip_get") {
        let mut storage = fx.open().await?;
        for entity in sample_graph() {
            storage.new(entity.clone()).await?;
            storage.save().await?;
            let found = storage.get(entity.kind(), entity.id()).await?;
            assert_eq!(found.as_ref(), Some(&entity), "{}: {}", fx.name, entity.key());
        }
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn delete_then_save_makes_entity_absent() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("delete") {
        let mut storage = fx.open().await?;
        let graph = sample_graph();
        for entity in &graph {
            storage.new(entity.clone()).await?;
        }
        storage.save().await?;
        for entity in &graph {
            storage.delete(entity).await?;
            storage.save().await?;
            assert!(storage.get(entity.kind(), entity.id()).await?.is_none(), "{}: {}", fx.name, entity.key());
        }
        assert_eq!(storage.count(None).await?, 0, "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn unfiltered_count_is_sum_of_kind_counts() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("count_sum") {
        let mut storage = fx.open().await?;
        for entity in sample_graph().into_iter().chain(sample_graph()) {
            storage.new(entity).await?;
        }
        storage.save().await?;
        let mut sum = 0;
        for kind in EntityKind::ALL {
            sum += storage.count(Some(kind)).await?;
        }
        assert_eq!(storage.count(None).await?, sum, "{}", fx.name);
        assert_eq!(sum, 12, "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn save_then_fresh_open_reconstructs_the_graph() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("reopen") {
        let mut first = fx.open().await?;
        for entity in sample_graph() {
            first.new(entity).await?;
        }
        first.save().await?;
        let before = first.all(None).await?;
        first.close().await?;

        let mut second = fx.open().await?;
        let after = second.all(None).await?;
        assert_eq!(before.keys().collect::<Vec<_>>(), after.keys().collect::<Vec<_>>(), "{}", fx.name);
        for (key, entity) in &before {
            assert_eq!(entity.to_document()?, after[key].to_document()?, "{}: {}", fx.name, key);
        }
        second.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn second_save_without_changes_is_idempotent() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("idempotent") {
        let mut storage = fx.open().await?;
        for entity in sample_graph() {
            storage.new(entity).await?;
        }
        storage.save().await?;
        let all_once = storage.all(None).await?;
        let count_once = storage.count(None).await?;

        storage.save().await?;
        let all_twice = storage.all(None).await?;
        assert_eq!(storage.count(None).await?, count_once, "{}", fx.name);
        for (key, entity) in &all_once {
            assert_eq!(entity.to_document()?, all_twice[key].to_document()?, "{}: {}", fx.name, key);
        }
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn california_and_san_francisco() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("california") {
        let mut storage = fx.open().await?;
        let ca = state::Model::new("California");
        let sf = city::Model::new("San Francisco", &ca.id);
        storage.new(ca.clone()).await?;
        storage.new(sf.clone()).await?;
        storage.save().await?;

        let got = storage.get_as::<city::Model>(&sf.id).await?.expect("city saved");
        assert_eq!(got.state_id, ca.id, "{}", fx.name);
        assert_eq!(got.name, "San Francisco", "{}", fx.name);
        assert_eq!(storage.count(Some(EntityKind::State)).await?, 1, "{}", fx.name);

        let cities = storage.all_by(ForeignKey::CityState, &ca.id).await?;
        assert_eq!(cities, vec![AnyEntity::from(sf)], "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn three_states() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("three_states") {
        let mut storage = fx.open().await?;
        for name in ["Arizona", "Nevada", "Oregon"] {
            storage.new(state::Model::new(name)).await?;
        }
        storage.save().await?;
        assert!(storage.count(None).await? >= 3, "{}", fx.name);
        assert_eq!(storage.count(Some(EntityKind::State)).await?, 3, "{}", fx.name);
        assert_eq!(storage.count(Some(EntityKind::Amenity)).await?, 0, "{}", fx.name);
        assert_eq!(storage.all_of::<state::Model>().await?.len(), 3, "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn deleting_a_never_registered_entity_changes_nothing() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("phantom") {
        let mut storage = fx.open().await?;
        let kept = state::Model::new("Texas");
        storage.new(kept.clone()).await?;
        storage.save().await?;
        let before = storage.all(None).await?;

        let phantom = state::Model::new("Nowhere");
        storage.delete(&phantom).await?;
        storage.delete(Target::from(Uuid::new_v4().to_string())).await?;
        storage.save().await?;

        let after = storage.all(None).await?;
        assert_eq!(before.keys().collect::<Vec<_>>(), after.keys().collect::<Vec<_>>(), "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn update_bumps_updated_at_and_keeps_created_at() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("update") {
        let mut storage = fx.open().await?;
        let ca = state::Model::new("California");
        storage.new(ca.clone()).await?;
        storage.save().await?;
        let saved = storage.get_as::<state::Model>(&ca.id).await?.expect("state saved");

        let mut renamed = saved.clone();
        renamed.name = "Golden State".into();
        storage.new(renamed).await?;
        storage.save().await?;

        let updated = storage.get_as::<state::Model>(&ca.id).await?.expect("state kept");
        assert_eq!(updated.name, "Golden State", "{}", fx.name);
        assert!(updated.updated_at > saved.updated_at, "{}", fx.name);
        assert_eq!(updated.created_at, saved.created_at, "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn relationship_queries_follow_foreign_keys() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("relations") {
        let mut storage = fx.open().await?;
        let graph = sample_graph();
        for entity in &graph {
            storage.new(entity.clone()).await?;
        }
        storage.save().await?;

        let loft = graph.iter().find(|e| e.kind() == EntityKind::Place).expect("place in graph");
        let owner = graph.iter().find(|e| e.kind() == EntityKind::User).expect("user in graph");
        let reviews = storage.all_by(ForeignKey::ReviewPlace, loft.id()).await?;
        assert_eq!(reviews.len(), 1, "{}", fx.name);
        let owned = storage.all_by(ForeignKey::PlaceUser, owner.id()).await?;
        assert_eq!(owned, vec![loft.clone()], "{}", fx.name);

        let amenities = storage.amenities_of(loft.id()).await?;
        assert_eq!(amenities.len(), 1, "{}", fx.name);
        assert_eq!(amenities[0].kind(), EntityKind::Amenity, "{}", fx.name);
        assert!(storage.all_by(ForeignKey::CityState, "missing").await?.is_empty(), "{}", fx.name);
        storage.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn stored_password_verifies_but_is_not_on_the_wire() -> Result<(), anyhow::Error> {
    for fx in Fixture::both("password") {
        let mut storage = fx.open().await?;
        let u = user::Model::new("guest@hbnb.io", "hunter2")?;
        storage.new(u.clone()).await?;
        storage.save().await?;
        storage.close().await?;

        let mut again = fx.open().await?;
        let stored = again.get_as::<user::Model>(&u.id).await?.expect("user saved");
        assert!(stored.verify_password("hunter2"), "{}", fx.name);
        assert!(!stored.verify_password("wrong"), "{}", fx.name);
        assert!(!AnyEntity::from(stored).to_mapping()?.contains_key("password"), "{}", fx.name);
        again.close().await?;
    }
    Ok(())
}

#[tokio::test]
async fn relational_writes_stay_private_until_save() -> Result<(), anyhow::Error> {
    let fx = Fixture::sqlite("isolation");
    let mut writer = fx.open().await?;
    let mut reader = fx.open().await?;

    let ca = state::Model::new("California");
    writer.new(ca.clone()).await?;
    assert!(writer.get(state::Model::KIND, &ca.id).await?.is_some());
    assert_eq!(reader.count(None).await?, 0);
    reader.close().await?;

    writer.save().await?;
    reader.reload().await?;
    assert_eq!(reader.count(None).await?, 1);

    reader.close().await?;
    writer.close().await?;
    Ok(())
}
