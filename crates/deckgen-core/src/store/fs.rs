//! Local filesystem backend.
//!
//! Stores decks as plain files under a root directory, mirroring the
//! blob key scheme (`root/prefix/id.html`). Selected when no blob
//! token is configured, so a bare checkout still persists decks.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::store::StoredEntry;

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes one deck and returns its path as the location.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn put(&self, key: &str, html: &str) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, html)
            .with_context(|| format!("Failed to write deck to {}", path.display()))?;
        Ok(path.display().to_string())
    }

    /// Reads a deck by its store key. `None` when the file is absent.
    ///
    /// # Errors
    /// Returns an error for any read failure other than not-found.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        read_optional(&self.root.join(key))
    }

    /// Reads a deck from a previously returned location. `None` when the
    /// file is absent.
    ///
    /// # Errors
    /// Returns an error for any read failure other than not-found.
    pub fn fetch(&self, location: &str) -> Result<Option<String>> {
        read_optional(Path::new(location))
    }

    /// Lists stored decks under a key prefix. A missing prefix directory
    /// is an empty listing, not an error.
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be read.
    pub fn list(&self, prefix: &str) -> Result<Vec<StoredEntry>> {
        let dir = self.root.join(prefix);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list decks in {}", dir.display()));
            }
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            found.push(StoredEntry {
                pathname: format!("{prefix}/{name}"),
                location: path.display().to_string(),
            });
        }
        Ok(found)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(html) => Ok(Some(html)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read deck from {}", path.display())),
    }
}
