//! Transport seam: how artifact bytes reach the engine.
//!
//! The engine only ever asks for manifest-relative paths; whether they
//! come over HTTP or off a local directory is behind [`Transport`]. Tests
//! and offline tooling use [`FileTransport`] over a built output tree.

use std::path::PathBuf;

use async_trait::async_trait;
use zmhsearch_core::{ZmhError, ZmhResult};

/// Byte source for artifacts, addressed by manifest-relative path.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the raw body at `path`. Bodies may be gzip-compressed; the
    /// loader inflates transparently.
    async fn fetch(&self, path: &str) -> ZmhResult<Vec<u8>>;
}

/// HTTP transport rooted at a deployment base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpTransport {
    /// Create a transport for `base` (e.g. `https://example.com`).
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, path: &str) -> ZmhResult<Vec<u8>> {
        let url = format!("{}/{}", self.base.trim_end_matches('/'), path);
        let fail = |reason: String| ZmhError::FetchFailed {
            path: path.to_owned(),
            reason,
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }
        let body = response.bytes().await.map_err(|e| fail(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Directory-backed transport for tests and local tooling.
pub struct FileTransport {
    root: PathBuf,
}

impl FileTransport {
    /// Serve paths relative to `root` (the deployment's site root, i.e.
    /// the parent of the `assets/` directory).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn fetch(&self, path: &str) -> ZmhResult<Vec<u8>> {
        tokio::fs::read(self.root.join(path))
            .await
            .map_err(|e| ZmhError::FetchFailed {
                path: path.to_owned(),
                reason: e.to_string(),
            })
    }
}
