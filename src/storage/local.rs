//! Local filesystem sink for payload copies and metadata artifacts.

use std::path::{Path, PathBuf};

use crate::config::PathsConfig;
use crate::error::Result;
use crate::types::MetadataArtifact;
use crate::utils::{atomic_write, safe_path_component};

/// Writes `<payload_dir>/<category>/<item>.<ext>` and `<metadata_dir>/<category>/<item>.json`
#[derive(Clone, Debug)]
pub struct LocalStore {
    metadata_dir: PathBuf,
    payload_dir: PathBuf,
    payload_extension: String,
}

impl LocalStore {
    /// Create a store rooted at the configured directories
    pub fn new(paths: &PathsConfig, payload_extension: &str) -> Self {
        Self {
            metadata_dir: paths.metadata_dir.clone(),
            payload_dir: paths.payload_dir.clone(),
            payload_extension: payload_extension.to_string(),
        }
    }

    /// Root of the metadata artifact tree
    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// Create the directories this run writes into
    pub async fn prepare(&self, save_payloads: bool) -> Result<()> {
        tokio::fs::create_dir_all(&self.metadata_dir).await?;
        if save_payloads {
            tokio::fs::create_dir_all(&self.payload_dir).await?;
        }
        Ok(())
    }

    /// Where the metadata artifact for an item lives
    pub fn metadata_path(&self, category: &str, item_id: &str) -> PathBuf {
        self.metadata_dir
            .join(safe_path_component(category))
            .join(format!("{}.json", safe_path_component(item_id)))
    }

    /// Where the local payload copy for an item lives
    pub fn payload_path(&self, category: &str, item_id: &str) -> PathBuf {
        self.payload_dir.join(safe_path_component(category)).join(format!(
            "{}.{}",
            safe_path_component(item_id),
            self.payload_extension
        ))
    }

    /// Write the payload copy; overwrites an earlier copy of the same item
    pub async fn write_payload(&self, category: &str, item_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.payload_path(category, item_id);
        atomic_write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "payload saved locally");
        Ok(path)
    }

    /// Write the metadata artifact; overwrites an earlier artifact of the same item
    pub async fn write_metadata(&self, artifact: &MetadataArtifact) -> Result<PathBuf> {
        let path = self.metadata_path(&artifact.category, &artifact.record.item_id);
        let json = serde_json::to_vec_pretty(artifact)?;
        atomic_write(&path, &json).await?;
        Ok(path)
    }
}
