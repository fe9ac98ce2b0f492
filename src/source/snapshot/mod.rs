// Rank snapshots
// Raw rank list elements saved as `rank_{id}.json` so a later run can replay them


use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::Result;

/// Directory under the base directory that holds rank snapshots
pub const SNAPSHOT_DIR: &str = "ranks";

/// One saved rank: every element of every page, in page order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankSnapshot {
    pub rank_id: i64,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub list_elements: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    rank_id: i64,
    fetched_at: DateTime<Utc>,
    list_elements: &'a [Value],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankSnapshotStore {
    dir: PathBuf,
}

impl RankSnapshotStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `base_dir/ranks`
    #[inline]
    pub fn in_base_dir(base_dir: &Path) -> Self {
        Self::new(base_dir.join(SNAPSHOT_DIR))
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn path_for(&self, rank_id: i64) -> PathBuf {
        self.dir.join(format!("rank_{}.json", rank_id))
    }

    /// Write the elements of one rank, replacing any earlier snapshot
    #[inline]
    pub async fn save(&self, rank_id: i64, elements: &[Value]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await.with_context(|| {
            format!("Failed to create snapshot directory: {}", self.dir.display())
        })?;

        let snapshot = SnapshotRef {
            rank_id,
            fetched_at: Utc::now(),
            list_elements: elements,
        };
        let content = serde_json::to_string_pretty(&snapshot)
            .context("Failed to serialize rank snapshot")?;

        let path = self.path_for(rank_id);
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write rank snapshot: {}", path.display()))?;

        info!(
            "Saved rank {} snapshot ({} elements) to {}",
            rank_id,
            elements.len(),
            path.display()
        );
        Ok(path)
    }

    /// Read one rank back; `None` when no snapshot was saved for it
    #[inline]
    pub async fn load(&self, rank_id: i64) -> Result<Option<RankSnapshot>> {
        let path = self.path_for(rank_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            debug!("No snapshot for rank {} at {}", rank_id, path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read rank snapshot: {}", path.display()))?;
        let snapshot: RankSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Malformed rank snapshot: {}", path.display()))?;

        Ok(Some(snapshot))
    }
}
