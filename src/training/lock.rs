//! Exclusive lock on a model artifact path for the duration of a training run.

use crate::core::AcneError;
use crate::models::head::artifact::sibling_path;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Holds `<parent>/.<artifact>.lock` until dropped.
#[derive(Debug)]
pub struct ArtifactLock {
    path: PathBuf,
}

impl ArtifactLock {
    /// Creates the lock file next to `artifact_dir`.
    ///
    /// # Errors
    ///
    /// `Training` when another run already holds the lock.
    pub fn acquire(artifact_dir: &Path) -> Result<Self, AcneError> {
        let path = sibling_path(artifact_dir, "lock");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                debug!("acquired artifact lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(AcneError::training_error(format!(
                "another training run holds {}; remove the lock file if that run is gone",
                path.display()
            ))),
            Err(e) => Err(AcneError::training(
                format!("failed to create lock file {}", path.display()),
                e,
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to release artifact lock {}: {}", self.path.display(), e);
        }
    }
}
