//! Debug snapshots of frames and composites.
//!
//! Each capture session gets its own directory under the configured root.
//! Writes are fire-and-forget: a failed write is logged and never affects
//! the session.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DIR_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
const FILE_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Configured snapshot root.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    root: PathBuf,
}

impl SnapshotDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory for one session. Returns `None` (after logging)
    /// when it cannot be created.
    pub async fn session(&self, session_id: Uuid) -> Option<SessionSnapshots> {
        let dir = self.root.join(session_dir_name(Local::now(), session_id));
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => Some(SessionSnapshots { dir }),
            Err(e) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "snapshot directory unavailable; snapshots disabled"
                );
                None
            }
        }
    }
}

/// Snapshot directory of a single session.
#[derive(Debug, Clone)]
pub struct SessionSnapshots {
    dir: PathBuf,
}

impl SessionSnapshots {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` as `<timestamp>_<suffix>.jpg` in the background.
    pub fn write(&self, data: Vec<u8>, suffix: &'static str) {
        let path = self.dir.join(file_name(Local::now(), suffix));
        tokio::spawn(async move {
            if let Err(e) = tokio::fs::write(&path, &data).await {
                tracing::warn!(path = %path.display(), error = %e, "snapshot write failed");
            }
        });
    }
}

fn session_dir_name(now: DateTime<Local>, session_id: Uuid) -> String {
    let id = session_id.simple().to_string();
    format!("{}_{}", now.format(DIR_FORMAT), &id[..8])
}

fn file_name(now: DateTime<Local>, suffix: &str) -> String {
    format!("{}_{}.jpg", now.format(FILE_FORMAT), suffix)
}
