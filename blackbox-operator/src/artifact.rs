//! Whole-file artifacts owned by the operator.
//!
//! An artifact is only ever replaced in full: content is written to a
//! temporary file next to the target and renamed over it, so readers see
//! either the previous or the new document, never a mix.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

/// Result of [`Artifact::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Content on disk already matched; nothing was written.
    Unchanged,
    /// The artifact was (re)written.
    Replaced,
}

/// A file fully owned and rewritten by the operator.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content, or `None` if the artifact was never written.
    pub fn read(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the artifact with `content` unless it is already identical.
    pub fn replace(&self, content: &str) -> io::Result<WriteOutcome> {
        if self.read()?.as_deref() == Some(content) {
            debug!(path = %self.path.display(), "Artifact unchanged");
            return Ok(WriteOutcome::Unchanged);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), bytes = content.len(), "Artifact replaced");
        Ok(WriteOutcome::Replaced)
    }
}
