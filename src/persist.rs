//! Snapshots of the card store and where they are kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CardResult;
use crate::store::{CardId, CardStore};

/// Everything needed to rebuild the application state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub db: CardStore,
    pub root: CardId,
    /// Milliseconds since the epoch at snapshot creation
    pub timestamp: i64,
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Snapshot {
    pub fn new(db: CardStore, root: CardId) -> Self {
        Self {
            db,
            root,
            timestamp: now_millis(),
        }
    }

    pub fn to_json(&self) -> CardResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> CardResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Where a chosen snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Local,
    Remote,
}

/// Pick the snapshot to start from. The local one wins only when it is
/// strictly newer; on a tie the remote one is used.
pub fn choose_snapshot(
    local: Option<Snapshot>,
    remote: Option<Snapshot>,
) -> Option<(SnapshotSource, Snapshot)> {
    match (local, remote) {
        (None, None) => None,
        (Some(local), None) => Some((SnapshotSource::Local, local)),
        (None, Some(remote)) => Some((SnapshotSource::Remote, remote)),
        (Some(local), Some(remote)) => {
            if local.timestamp > remote.timestamp {
                Some((SnapshotSource::Local, local))
            } else {
                Some((SnapshotSource::Remote, remote))
            }
        }
    }
}

/// Somewhere a serialized snapshot can be kept.
pub trait Persistence {
    fn save(&self, serialized: &str) -> CardResult<()>;

    /// The most recently saved snapshot, if any.
    fn load(&self) -> CardResult<Option<String>>;

    fn load_snapshot(&self) -> CardResult<Option<Snapshot>> {
        match self.load()? {
            Some(text) => Ok(Some(Snapshot::from_json(&text)?)),
            None => Ok(None),
        }
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> CardResult<()> {
        self.save(&snapshot.to_json()?)
    }
}

/// Snapshot kept as a JSON file on the local disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("database.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FileStore {
    fn save(&self, serialized: &str) -> CardResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write next to the target, then rename over it
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = serialized.len(), "saved snapshot");
        Ok(())
    }

    fn load(&self) -> CardResult<Option<String>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no saved snapshot");
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }
}
