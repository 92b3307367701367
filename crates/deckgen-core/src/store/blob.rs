//! Blob-store backend.
//!
//! Wire contract: `PUT {base}/{key}` uploads one deck (Bearer token,
//! `x-content-type`, `x-add-random-suffix: 0`) and answers JSON
//! `{url, pathname}`; `GET {base}/{key}` retrieves by key; `GET
//! {base}/?prefix=` lists as `{blobs: [{url, pathname}]}`.

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::providers::resolve_base_url;
use crate::store::StoredEntry;

/// Default endpoint when `BLOB_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "https://blob.vercel-storage.com";

/// Environment variable holding the read-write token; its presence
/// selects this backend over the filesystem fallback.
pub const TOKEN_ENV: &str = "BLOB_READ_WRITE_TOKEN";

#[derive(Deserialize)]
struct PutResponse {
    url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    blobs: Vec<ListedBlob>,
}

#[derive(Deserialize)]
struct ListedBlob {
    url: String,
    pathname: String,
}

/// HTTP client for the blob store.
pub struct BlobBackend {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl BlobBackend {
    /// Builds the backend when the token env var is set and non-empty.
    /// Returns `Ok(None)` otherwise.
    ///
    /// # Errors
    /// Returns an error if a configured base URL is malformed.
    pub fn from_env() -> Result<Option<Self>> {
        let token = match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return Ok(None),
        };
        let base_url = resolve_base_url(None, "BLOB_BASE_URL", DEFAULT_BASE_URL, "blob store")?;
        Ok(Some(Self::new(base_url, token)))
    }

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers
    }

    /// Uploads one deck and returns its public URL.
    ///
    /// # Errors
    /// Returns an error if the request fails or the store answers with a
    /// non-success status.
    pub async fn put(&self, key: &str, html: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, key);
        let mut headers = self.auth_headers();
        headers.insert("x-content-type", HeaderValue::from_static("text/html"));
        headers.insert("x-add-random-suffix", HeaderValue::from_static("0"));

        let response = self
            .http
            .put(&url)
            .headers(headers)
            .body(html.to_string())
            .send()
            .await
            .context("blob upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("blob upload failed with HTTP {status}: {body}");
        }

        let uploaded: PutResponse = response
            .json()
            .await
            .context("blob upload response was not valid JSON")?;
        Ok(uploaded.url)
    }

    /// Fetches a deck by its store key. `None` when the key is absent.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-404 error status.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.fetch(&format!("{}/{}", self.base_url, key)).await
    }

    /// Fetches a deck from a fully-resolved URL. `None` on 404.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-404 error status.
    pub async fn fetch(&self, location: &str) -> Result<Option<String>> {
        let response = self
            .http
            .get(location)
            .headers(self.auth_headers())
            .send()
            .await
            .context("blob fetch request failed")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let html = response.text().await.context("failed to read blob body")?;
                Ok(Some(html))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("blob fetch failed with HTTP {status}: {body}")
            }
        }
    }

    /// Lists stored decks under a key prefix.
    ///
    /// # Errors
    /// Returns an error if the request fails or the listing cannot be
    /// parsed.
    pub async fn list(&self, prefix: &str) -> Result<Vec<StoredEntry>> {
        let url = format!("{}/?prefix={prefix}", self.base_url);
        let response = self
            .http
            .get(&url)
            .headers(self.auth_headers())
            .send()
            .await
            .context("blob listing request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("blob listing failed with HTTP {status}: {body}");
        }

        let listing: ListResponse = response
            .json()
            .await
            .context("blob listing response was not valid JSON")?;
        Ok(listing
            .blobs
            .into_iter()
            .map(|blob| StoredEntry {
                pathname: blob.pathname,
                location: blob.url,
            })
            .collect())
    }
}
