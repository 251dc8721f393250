//! Research checkpoint: persists the aggregated research content after each Research pass.

use crate::error::StorageError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Well-known artifact name, relative to the workspace.
pub const DEFAULT_CHECKPOINT_FILE: &str = "research_output.md";

/// Writes the aggregated content to a single UTF-8 file, replacing previous contents.
#[derive(Debug, Clone)]
pub struct ResearchCheckpoint {
    path: PathBuf,
}

impl ResearchCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint at the default file name inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, content: &str) -> Result<(), StorageError> {
        if self.path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath(
                "checkpoint path is empty".to_string(),
            ));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content).map_err(|source| StorageError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), bytes = content.len(), "research content saved");
        Ok(())
    }
}
