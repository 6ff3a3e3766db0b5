//! File-backed broadcaster
//!
//! Writes the snapshot as a small JSON document. The file is replaced by an
//! atomic rename, so readers in other processes never observe a torn write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{BroadcastError, BroadcastSnapshot, PositionBroadcaster};
use crate::lock;

/// Broadcaster that persists the snapshot to a world-readable file
pub struct FileBroadcaster {
    path: PathBuf,
    // Serializes writers so temp files never collide
    write_lock: Mutex<()>,
}

impl FileBroadcaster {
    /// Create a broadcaster writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a snapshot back from a store file
    pub fn read(path: impl AsRef<Path>) -> Result<BroadcastSnapshot, BroadcastError> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PositionBroadcaster for FileBroadcaster {
    fn publish(&self, snapshot: BroadcastSnapshot) -> Result<(), BroadcastError> {
        let _guard = lock(&self.write_lock);

        let data = serde_json::to_vec(&snapshot)?;
        let temp = self.temp_path();
        fs::write(&temp, data)?;
        fs::rename(&temp, &self.path)?;

        Ok(())
    }
}
