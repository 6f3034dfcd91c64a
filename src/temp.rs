//! Scoped temporary storage for a single run.
//!
//! Every audio file produced by the extractor or the reducer is owned by a
//! [`TempAudio`] handle which deletes the file when dropped. All handles live
//! inside a [`RunWorkspace`], a directory exclusive to one run that is removed
//! as a whole when the run ends.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Owned temporary audio file, deleted on drop.
#[derive(Debug)]
pub struct TempAudio {
    path: PathBuf,
}

impl TempAudio {
    /// Take ownership of a file path. The file does not have to exist yet.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size on disk in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Delete now instead of waiting for drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        match remove_if_present(&self.path) {
            Ok(true) => debug!("Removed temporary file {}", self.path.display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove temporary file {}: {}", self.path.display(), e),
        }
    }
}

/// Remove a file, treating an already-missing file as clean.
pub fn remove_if_present(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Temporary directory exclusive to one run.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    pub fn create(root: Option<&Path>, job_id: Uuid) -> Result<Self> {
        let prefix = format!("vidsub-{}-", job_id.simple());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        debug!("Created run workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve a file inside the workspace.
    pub fn file(&self, name: &str) -> TempAudio {
        TempAudio::adopt(self.dir.path().join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_handle_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let handle = TempAudio::adopt(path.clone());
        assert_eq!(handle.size().unwrap(), 4);
        drop(handle);

        assert!(!path.exists());
    }

    #[test]
    fn missing_file_counts_as_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written.mp3");

        assert!(!remove_if_present(&path).unwrap());
        TempAudio::adopt(path).release();
    }

    #[test]
    fn workspace_is_removed_with_its_files() {
        let root = tempfile::tempdir().unwrap();
        let workspace = RunWorkspace::create(Some(root.path()), Uuid::new_v4()).unwrap();
        let ws_path = workspace.path().to_path_buf();

        let file = workspace.file("segment_0.mp3");
        std::fs::write(file.path(), b"ID3").unwrap();
        std::mem::forget(file);

        assert!(ws_path.exists());
        drop(workspace);
        assert!(!ws_path.exists());
    }
}
