//! Scoped temporary artifacts
//!
//! Engines need real files. Every request that touches the filesystem gets its
//! own scratch directory, named from a per-request token, and the directory
//! (with everything in it) is removed when the scope is dropped or closed.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Factory for per-request artifact scopes under a fixed root
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a new scope for one request.
    ///
    /// The directory name embeds `token` plus a random suffix, so two requests
    /// uploading the same filename never share a path.
    pub fn scope(&self, token: &str) -> Result<ArtifactScope> {
        std::fs::create_dir_all(&self.root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("pdf-transform-{}-", token))
            .tempdir_in(&self.root)?;
        tracing::debug!(path = %dir.path().display(), "Created artifact scope");
        Ok(ArtifactScope { dir })
    }
}

/// Scratch directory owned by exactly one request
#[derive(Debug)]
pub struct ArtifactScope {
    dir: TempDir,
}

impl ArtifactScope {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a named artifact inside the scope. Names must be plain file
    /// names; anything with directory components is rejected.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let candidate = Path::new(name);
        let is_plain = candidate.components().count() == 1
            && candidate.file_name().is_some_and(|f| f == candidate.as_os_str());
        if !is_plain {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("artifact name must be a plain file name: {}", name),
            )));
        }
        Ok(self.dir.path().join(name))
    }

    /// Write bytes to a named artifact and return its path
    pub fn write(&self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        std::fs::write(&path, data)?;
        Ok(path)
    }

    /// Create a named subdirectory (e.g. for multi-file engine output)
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        std::fs::create_dir(&path)?;
        Ok(path)
    }

    /// Read a named artifact back into memory
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        Ok(std::fs::read(path)?)
    }

    /// Remove the scope now, reporting cleanup errors instead of swallowing
    /// them like `Drop` does.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "Released artifact scope");
        Ok(())
    }
}
