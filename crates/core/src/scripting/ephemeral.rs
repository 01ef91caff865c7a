//! Scoped on-disk script files.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Prefix of every script directory.
const DIR_PREFIX: &str = "hostexec";

/// Source code written to a uniquely named file inside its own uniquely
/// named temporary directory.
///
/// The directory and everything in it is removed when the value is
/// dropped, whichever way the owning call returns. [`cleanup`](Self::cleanup)
/// removes it early and reports errors; calling it again is a no-op.
#[derive(Debug)]
pub struct EphemeralScript {
    dir: Option<TempDir>,
    dir_path: PathBuf,
    path: PathBuf,
    source: String,
}

impl EphemeralScript {
    /// Create the directory under `root` (the system temp dir when `None`)
    /// and write `source` verbatim into a file ending in `extension`.
    ///
    /// On any write failure the partially created directory is removed
    /// before the error is returned.
    pub fn create(root: Option<&Path>, extension: &str, source: &str) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile_in(dir.path())?;
        file.write_all(source.as_bytes())?;
        file.flush()?;
        // The handle closes here; the directory owns the file's lifetime.
        let (_, path) = file.keep()?;

        Ok(Self {
            dir_path: dir.path().to_path_buf(),
            dir: Some(dir),
            path,
            source: source.to_string(),
        })
    }

    /// Path of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the enclosing temporary directory.
    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Remove the directory now.
    pub fn cleanup(&mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
