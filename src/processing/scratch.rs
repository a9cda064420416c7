//! Request-scoped scratch files.
//!
//! Every file gets a fresh UUID name and is opened with `create_new`, so concurrent requests
//! never share a path. The guard deletes the file when dropped, which covers success, early
//! returns, timeouts, and task cancellation alike.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use uuid::Uuid;

/// Owned scratch file that is removed from disk on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Create a new, empty scratch file inside `dir` and return it opened for writing.
    pub async fn create(dir: &Path, extension: &str) -> io::Result<(Self, File)> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.{extension}", Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        tracing::trace!(path = %path.display(), "Created scratch file");
        Ok((Self { path }, file))
    }

    /// Location of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file back into memory.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!(path = %self.path.display(), "Removed scratch file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove scratch file"
            ),
        }
    }
}
