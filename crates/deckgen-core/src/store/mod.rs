//! Deck persistence: blob-store backend with filesystem fallback.
//!
//! Decks are write-once: each save mints a fresh UUID and a backend
//! location. Lookup is tiered: the in-memory location cache, then a
//! direct fetch by the expected key, then a full listing scan. Only a
//! miss in the listing scan counts as not-found.

pub mod blob;
pub mod fs;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;

/// Record returned by a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDeck {
    pub id: String,
    /// Backend-resolvable location: a public blob URL or a local file
    /// path.
    pub location: String,
}

/// One entry from a backend listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Key-like path within the store (`prefix/name.html`).
    pub pathname: String,
    /// Resolvable location of this entry.
    pub location: String,
}

/// In-memory identifier → location cache.
///
/// Non-authoritative: primed on save, consulted as the first lookup
/// tier; a miss or stale entry falls through to the backend tiers.
/// Upsert-only and unbounded; an id never remaps to a different
/// location.
#[derive(Debug, Default)]
pub struct LocationCache {
    entries: Mutex<HashMap<String, String>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, location: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id.to_string(), location.to_string());
        }
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(id).cloned())
    }
}

/// Storage backend selection.
pub enum DeckBackend {
    Blob(blob::BlobBackend),
    Fs(fs::FsBackend),
}

impl DeckBackend {
    pub fn name(&self) -> &'static str {
        match self {
            DeckBackend::Blob(_) => "blob",
            DeckBackend::Fs(_) => "fs",
        }
    }

    async fn put(&self, key: &str, html: &str) -> Result<String> {
        match self {
            DeckBackend::Blob(backend) => backend.put(key, html).await,
            DeckBackend::Fs(backend) => backend.put(key, html),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            DeckBackend::Blob(backend) => backend.get(key).await,
            DeckBackend::Fs(backend) => backend.get(key),
        }
    }

    async fn fetch(&self, location: &str) -> Result<Option<String>> {
        match self {
            DeckBackend::Blob(backend) => backend.fetch(location).await,
            DeckBackend::Fs(backend) => backend.fetch(location),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredEntry>> {
        match self {
            DeckBackend::Blob(backend) => backend.list(prefix).await,
            DeckBackend::Fs(backend) => backend.list(prefix),
        }
    }
}

/// Write-once deck store with tiered lookup.
pub struct DeckStore {
    backend: DeckBackend,
    cache: LocationCache,
    prefix: String,
}

impl DeckStore {
    /// Creates a store with an explicit backend and cache.
    pub fn new(backend: DeckBackend, cache: LocationCache, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            cache,
            prefix: prefix.into(),
        }
    }

    /// Selects the backend from the environment: the blob store when
    /// `BLOB_READ_WRITE_TOKEN` is set, the local filesystem otherwise.
    ///
    /// # Errors
    /// Returns an error if the blob backend is selected but misconfigured.
    pub fn from_env(config: &StorageConfig) -> Result<Self> {
        let backend = match blob::BlobBackend::from_env()? {
            Some(backend) => DeckBackend::Blob(backend),
            None => DeckBackend::Fs(fs::FsBackend::new(&config.dir)),
        };
        Ok(Self::new(backend, LocationCache::new(), config.prefix.clone()))
    }

    /// Returns the backend key a deck id maps to.
    pub fn expected_key(&self, id: &str) -> String {
        format!("{}/{id}.html", self.prefix)
    }

    /// Name of the active backend, for logs.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Persists a deck under a fresh id and primes the location cache.
    ///
    /// # Errors
    /// Returns an error if the backend write fails.
    pub async fn save(&self, html: &str) -> Result<SavedDeck> {
        let id = Uuid::new_v4().to_string();
        let key = self.expected_key(&id);
        let location = self.backend.put(&key, html).await?;

        self.cache.insert(&id, &location);
        info!(%id, backend = self.backend.name(), "deck saved");
        Ok(SavedDeck { id, location })
    }

    /// Resolves a deck id to its stored HTML.
    ///
    /// Tried in order: cached location, direct lookup by the expected
    /// key, listing scan matched by id substring. Failures in the first
    /// two tiers are logged and fall through; only the listing tier's
    /// outcome is authoritative.
    ///
    /// # Errors
    /// Returns an error if the listing tier itself fails.
    pub async fn load(&self, id: &str) -> Result<Option<String>> {
        if let Some(location) = self.cache.get(id) {
            match self.backend.fetch(&location).await {
                Ok(Some(html)) => {
                    debug!(%id, tier = "cache", "deck resolved");
                    return Ok(Some(html));
                }
                Ok(None) => debug!(%id, "cached location no longer resolves"),
                Err(error) => warn!(%id, %error, "cached location fetch failed"),
            }
        }

        let key = self.expected_key(id);
        match self.backend.get(&key).await {
            Ok(Some(html)) => {
                debug!(%id, tier = "direct", "deck resolved");
                return Ok(Some(html));
            }
            Ok(None) => {}
            Err(error) => warn!(%id, %error, "direct deck lookup failed"),
        }

        for entry in self.backend.list(&self.prefix).await? {
            if entry.pathname.contains(id) || entry.location.contains(id) {
                debug!(%id, tier = "listing", "deck resolved");
                return self.backend.fetch(&entry.location).await;
            }
        }

        debug!(%id, "deck not found");
        Ok(None)
    }
}
