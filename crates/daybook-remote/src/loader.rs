//! Resolving confirmed image references to displayable bytes.
//!
//! Blob storage occasionally answers with an empty body for an object that
//! exists, so a load is retried a bounded number of times before falling
//! back to a plain HTTP fetch of the URL. Anything still missing is reported
//! as unavailable for that one image; decode failures are reported
//! separately. Successful loads are memoized in a small LRU cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tracing::{debug, warn};

use daybook_shared::constants::DEFAULT_IMAGE_LOAD_ATTEMPTS;

use crate::error::{RemoteError, Result};
use crate::store::RemoteStore;

const RETRY_DELAY: Duration = Duration::from_millis(150);
const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Outcome of loading one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLoad {
    Loaded(Bytes),
    /// Bytes arrived but are not a decodable image.
    Failed,
    /// Nothing could be fetched.
    Unavailable,
}

/// Direct-protocol fetch used after blob-store retries are exhausted.
#[async_trait]
pub trait DirectFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// [`DirectFetch`] over plain HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DirectFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(RemoteError::Unsupported(url.to_string()));
        }
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

pub struct ImageLoader {
    remote: Arc<dyn RemoteStore>,
    direct: Option<Arc<dyn DirectFetch>>,
    attempts: u32,
    cache: Mutex<LruCache<String, Bytes>>,
}

impl ImageLoader {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            direct: None,
            attempts: DEFAULT_IMAGE_LOAD_ATTEMPTS,
            cache: Mutex::new(LruCache::new(cache_capacity(DEFAULT_CACHE_CAPACITY))),
        }
    }

    pub fn with_direct_fetch(mut self, direct: Arc<dyn DirectFetch>) -> Self {
        self.direct = Some(direct);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Mutex::new(LruCache::new(cache_capacity(capacity)));
        self
    }

    pub async fn load(&self, url: &str) -> ImageLoad {
        if let Some(bytes) = self.cached(url) {
            return ImageLoad::Loaded(bytes);
        }

        for attempt in 1..=self.attempts {
            match self.remote.download_blob(url).await {
                Ok(bytes) if !bytes.is_empty() => return self.finish(url, bytes),
                Ok(_) => debug!(url, attempt, "empty image body"),
                Err(e) if e.is_not_found() => {
                    debug!(url, "image not in blob store");
                    break;
                }
                Err(e) => warn!(url, attempt, error = %e, "image download failed"),
            }
            if attempt < self.attempts {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        if let Some(direct) = &self.direct {
            match direct.fetch(url).await {
                Ok(bytes) if !bytes.is_empty() => return self.finish(url, bytes),
                Ok(_) => debug!(url, "direct fetch returned empty body"),
                Err(e) => debug!(url, error = %e, "direct fetch failed"),
            }
        }

        warn!(url, "image unavailable");
        ImageLoad::Unavailable
    }

    /// Forget a memoized image (after it was deleted).
    pub fn evict(&self, url: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(url);
        }
    }

    fn cached(&self, url: &str) -> Option<Bytes> {
        self.cache.lock().ok()?.get(url).cloned()
    }

    fn finish(&self, url: &str, bytes: Bytes) -> ImageLoad {
        if let Err(e) = image::load_from_memory(&bytes) {
            warn!(url, error = %e, "failed to decode image");
            return ImageLoad::Failed;
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(url.to_string(), bytes.clone());
        }
        ImageLoad::Loaded(bytes)
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
