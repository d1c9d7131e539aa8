//! Session snapshot storage
//!
//! Each open session can be backed by `<session-id>.json` in a storage
//! directory. Files are written and removed explicitly by the owner.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use uuid::Uuid;

use super::snapshot::CardSnapshot;
use crate::error::StoreError;

/// Directory of session snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    storage_dir: PathBuf,
}

impl SnapshotStore {
    const EXTENSION: &'static str = "json";

    /// Get the default storage directory
    pub fn default_storage_dir() -> PathBuf {
        // Check environment variable first
        if let Ok(path) = std::env::var("CARDSIM_SESSION_DIR") {
            return PathBuf::from(path);
        }
        if let Some(data) = dirs::data_local_dir() {
            return data.join("cardsim").join("sessions");
        }
        std::env::temp_dir().join("cardsim_sessions")
    }

    /// Create a store rooted at `storage_path`, or the default directory
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        Self {
            storage_dir: storage_path.unwrap_or_else(Self::default_storage_dir),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// File backing one session
    pub fn path_for(&self, session_id: Uuid) -> PathBuf {
        self.storage_dir
            .join(format!("{}.{}", session_id, Self::EXTENSION))
    }

    /// Ensure the storage directory exists
    fn ensure_storage_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.storage_dir).map_err(|source| StoreError::Io {
            path: self.storage_dir.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.storage_dir, fs::Permissions::from_mode(0o700));
        }
        Ok(())
    }

    /// Write a snapshot, replacing any previous one for the session
    pub fn save(&self, snapshot: &CardSnapshot) -> Result<PathBuf, StoreError> {
        self.ensure_storage_dir()?;
        let path = self.path_for(snapshot.session_id);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json).map_err(|source| {
            warn!("Failed to write session snapshot {:?}: {}", path, source);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })?;
        debug!("Saved session snapshot to {:?}", path);
        Ok(path)
    }

    /// Read the snapshot of a session
    pub fn load(&self, session_id: Uuid) -> Result<CardSnapshot, StoreError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Err(StoreError::NotFound(session_id));
        }
        self.load_path(&path)
    }

    /// Read a snapshot from an explicit file
    pub fn load_path(&self, path: &Path) -> Result<CardSnapshot, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: CardSnapshot = serde_json::from_str(&content).map_err(|e| {
            warn!("Failed to parse session snapshot {:?}: {}", path, e);
            e
        })?;
        snapshot.validate().map_err(StoreError::Invalid)?;
        info!("Loaded session snapshot from {:?}", path);
        Ok(snapshot)
    }

    /// Delete the snapshot of a session; false when there was none
    pub fn remove(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Removed session snapshot {:?}", path);
        Ok(true)
    }

    /// Session ids with a snapshot on disk
    pub fn list(&self) -> Result<Vec<Uuid>, StoreError> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.storage_dir).map_err(|source| StoreError::Io {
            path: self.storage_dir.clone(),
            source,
        })?;

        let mut ids: Vec<Uuid> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(Self::EXTENSION))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}
