//! Embedded datastore bootstrap.
//!
//! The listener is not bound until this resolves: the data directory must be
//! writable and the store metadata readable before the server accepts its
//! first request. Corrupt metadata or an unknown schema version stops
//! startup rather than serving against a store we do not understand.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DbConfig;

/// File holding the store metadata inside the data directory.
pub const STORE_META_FILE: &str = "quarry.json";

/// Schema version written by this build.
const SCHEMA_VERSION: u32 = 1;

/// Metadata persisted alongside the store files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to prepare data directory {dir}: {source}")]
    Prepare {
        dir: String,
        source: std::io::Error,
    },

    #[error("Failed to read store metadata {path}: {source}")]
    ReadMeta {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store metadata {path} is corrupt: {source}")]
    ParseMeta {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Store schema version {found} is newer than this build supports ({supported})")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("Failed to write store metadata {path}: {source}")]
    WriteMeta {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode store metadata: {0}")]
    EncodeMeta(serde_json::Error),
}

/// Prepare the data directory and load (or create) the store metadata.
///
/// This is the readiness gate for the whole startup sequence.
pub async fn ready(config: &DbConfig) -> Result<StoreMeta, DbError> {
    tokio::fs::create_dir_all(&config.dir)
        .await
        .map_err(|source| DbError::Prepare {
            dir: config.dir.clone(),
            source,
        })?;

    let meta_path = Path::new(&config.dir).join(STORE_META_FILE);
    match tokio::fs::read_to_string(&meta_path).await {
        Ok(contents) => {
            let meta: StoreMeta =
                serde_json::from_str(&contents).map_err(|source| DbError::ParseMeta {
                    path: meta_path.clone(),
                    source,
                })?;
            if meta.schema_version > SCHEMA_VERSION {
                return Err(DbError::SchemaVersion {
                    found: meta.schema_version,
                    supported: SCHEMA_VERSION,
                });
            }
            tracing::debug!(path = %meta_path.display(), schema_version = meta.schema_version, "Loaded store metadata");
            Ok(meta)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let meta = StoreMeta {
                schema_version: SCHEMA_VERSION,
            };
            let encoded = serde_json::to_string_pretty(&meta).map_err(DbError::EncodeMeta)?;
            tokio::fs::write(&meta_path, encoded)
                .await
                .map_err(|source| DbError::WriteMeta {
                    path: meta_path.clone(),
                    source,
                })?;
            tracing::info!(path = %meta_path.display(), "Initialized new datastore");
            Ok(meta)
        }
        Err(source) => Err(DbError::ReadMeta {
            path: meta_path,
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config(dir: &Path) -> DbConfig {
        toml::from_str(&format!("dir = \"{}\"", dir.display())).unwrap()
    }

    #[tokio::test]
    async fn fresh_directory_is_initialized() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");

        let meta = ready(&db_config(&dir)).await.unwrap();
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert!(dir.join(STORE_META_FILE).exists());
    }

    #[tokio::test]
    async fn existing_metadata_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(STORE_META_FILE),
            "{\"schema_version\": 1}",
        )
        .unwrap();

        let meta = ready(&db_config(tmp.path())).await.unwrap();
        assert_eq!(meta.schema_version, 1);
    }

    #[tokio::test]
    async fn corrupt_metadata_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(STORE_META_FILE), "not json").unwrap();

        assert!(matches!(
            ready(&db_config(tmp.path())).await,
            Err(DbError::ParseMeta { .. })
        ));
    }

    #[tokio::test]
    async fn future_schema_version_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(STORE_META_FILE),
            "{\"schema_version\": 99}",
        )
        .unwrap();

        assert!(matches!(
            ready(&db_config(tmp.path())).await,
            Err(DbError::SchemaVersion {
                found: 99,
                supported: SCHEMA_VERSION
            })
        ));
    }
}
