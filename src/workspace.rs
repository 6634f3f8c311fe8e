//! Per-identifier ephemeral file layout.
//!
//! Every request identifier owns up to three files under the workdir:
//! `<id>.src` (submitted source), `<id>.bin` (compiled binary) and
//! `<id>.stdin` (captured standard input). `remove` deletes whatever
//! subset exists and never fails solely because a file is already gone.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Handle to the workdir holding all ephemeral artifacts.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (and create if needed) the workspace directory.
    pub fn new(root: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.src"))
    }

    pub fn binary_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.bin"))
    }

    pub fn stdin_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.stdin"))
    }

    /// Persist submitted source text for `id`.
    pub async fn write_source(&self, id: &str, source: &str) -> io::Result<PathBuf> {
        let path = self.source_path(id);
        tokio::fs::write(&path, source).await?;
        Ok(path)
    }

    /// Persist the stdin supplied for one execution of `id`.
    pub async fn write_stdin(&self, id: &str, input: &str) -> io::Result<PathBuf> {
        let path = self.stdin_path(id);
        tokio::fs::write(&path, input).await?;
        Ok(path)
    }

    /// Delete every ephemeral file associated with `id`.
    ///
    /// Best effort: a missing file is not an error, and any other
    /// deletion failure is logged and skipped.
    pub async fn remove(&self, id: &str) {
        for path in [
            self.source_path(id),
            self.binary_path(id),
            self.stdin_path(id),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed artifact file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove artifact file");
                }
            }
        }
    }
}
