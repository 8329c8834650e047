//! Per-job scratch directories on the slave.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A private directory holding one submission's source and build outputs
pub struct Workspace {
    dir: TempDir,
    source_path: PathBuf,
}

impl Workspace {
    /// Create a fresh directory under `cache_dir` and write `code` into it.
    pub async fn stage(cache_dir: &Path, source_name: &str, code: &str) -> Result<Self> {
        tokio::fs::create_dir_all(cache_dir)
            .await
            .with_context(|| format!("Failed to create cache dir {:?}", cache_dir))?;

        let dir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(cache_dir)
            .context("Failed to create scratch directory")?;

        let source_path = dir.path().join(source_name);
        tokio::fs::write(&source_path, code)
            .await
            .with_context(|| format!("Failed to write source to {:?}", source_path))?;

        debug!("Staged source at {:?}", source_path);
        Ok(Self { dir, source_path })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Remove the directory. Failures are logged, never returned.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed scratch directory {:?}", path),
            Err(e) => warn!("Failed to remove scratch directory {:?}: {}", path, e),
        }
    }
}
