#![cfg(test)]
use std::path::{Path, PathBuf};

use configs::{DatabaseConfig, StorageConfig, StorageMode};
use uuid::Uuid;

pub fn temp_json_path(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("hbnb_{}_{}.json", prefix, Uuid::new_v4()))
}

/// SQLite database in a fresh temp file, so each test gets its own schema.
pub fn sqlite_config(prefix: &str) -> (DatabaseConfig, PathBuf) {
    let path = std::env::temp_dir().join(format!("hbnb_{}_{}.db", prefix, Uuid::new_v4()));
    let cfg = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        max_connections: 4,
        ..DatabaseConfig::default()
    };
    (cfg, path)
}

pub fn file_config(prefix: &str) -> (StorageConfig, PathBuf) {
    let path = temp_json_path(prefix);
    let mut cfg = StorageConfig { mode: StorageMode::File, ..StorageConfig::default() };
    cfg.file.path = path.clone();
    (cfg, path)
}

pub fn sqlite_storage_config(prefix: &str) -> (StorageConfig, PathBuf) {
    let (database, path) = sqlite_config(prefix);
    (StorageConfig { mode: StorageMode::Db, database, ..StorageConfig::default() }, path)
}

/// Remove the database file and the WAL/SHM companions SQLite leaves behind.
pub fn remove_sqlite(path: &Path) {
    let _ = std::fs::remove_file(path);
    for suffix in ["-wal", "-shm"] {
        let mut companion = path.as_os_str().to_os_string();
        companion.push(suffix);
        let _ = std::fs::remove_file(companion);
    }
}
