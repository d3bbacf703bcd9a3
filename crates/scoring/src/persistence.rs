//! Snapshot persistence: both fitted models in one JSON document, written
//! atomically so a crash mid-write never leaves a truncated file behind.

use crate::price::PriceModel;
use crate::recommender::RecommenderModel;
use appswap_core::{ScoringError, ScoringResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub price: Option<PriceModel>,
    pub recommender: Option<RecommenderModel>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &PersistedSnapshot) -> ScoringResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_vec(snapshot)?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, body)?;
        std::fs::rename(&temp_path, &self.path)?;
        info!(path = %self.path.display(), "Model snapshot persisted");
        Ok(())
    }

    /// `Ok(None)` when nothing has been persisted yet.
    pub fn load(&self) -> ScoringResult<Option<PersistedSnapshot>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut snapshot: PersistedSnapshot = serde_json::from_slice(&raw)?;
        if snapshot.format_version != FORMAT_VERSION {
            return Err(ScoringError::Persistence(format!(
                "unsupported snapshot format version {} (expected {FORMAT_VERSION})",
                snapshot.format_version
            )));
        }
        if let Some(recommender) = snapshot.recommender.as_mut() {
            if !recommender.is_consistent() {
                return Err(ScoringError::Persistence(
                    "similarity matrix does not match the item table".to_string(),
                ));
            }
            recommender.reindex();
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupted_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let err = SnapshotStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ScoringError::Serialization(_)));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested/snapshot.json"));
        let snapshot = PersistedSnapshot {
            format_version: FORMAT_VERSION + 1,
            trained_at: Utc::now(),
            price: None,
            recommender: None,
        };
        store.save(&snapshot).unwrap();
        assert!(matches!(
            store.load().unwrap_err(),
            ScoringError::Persistence(_)
        ));
        assert!(!store.path().with_extension("tmp").exists());
    }
}
