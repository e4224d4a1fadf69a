//! Install-time precaching of the asset manifest.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::cache::{CacheStorage, CacheStore};
use crate::error::CacheError;
use crate::network::Network;
use crate::request::{Request, RequestKey, Response};

/// Assets the app cannot start without.
pub const DEFAULT_MANIFEST: &[&str] = &["/index.html", "/favicon.ico", "/waiver.txt"];

/// Ordered list of absolute paths that must be resident before install completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
  paths: Vec<String>,
}

impl Manifest {
  pub fn new(paths: Vec<String>) -> Self {
    Self { paths }
  }

  pub fn contains(&self, path: &str) -> bool {
    self.paths.iter().any(|p| p == path)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.paths.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }
}

impl Default for Manifest {
  fn default() -> Self {
    Self::new(DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect())
  }
}

/// Fetches every manifest asset and stores them into the current generation.
pub struct PrecacheLoader<S: CacheStorage, N: Network> {
  store: CacheStore<S>,
  network: Arc<N>,
  origin: Url,
  generation: String,
  manifest: Manifest,
}

impl<S: CacheStorage, N: Network> PrecacheLoader<S, N> {
  pub fn new(
    store: CacheStore<S>,
    network: Arc<N>,
    origin: Url,
    generation: impl Into<String>,
    manifest: Manifest,
  ) -> Self {
    Self {
      store,
      network,
      origin,
      generation: generation.into(),
      manifest,
    }
  }

  /// Precache the whole manifest.
  ///
  /// Every asset is fetched first; nothing is written unless all of them
  /// came back with a success status, and then all are written in one batch.
  /// Running it again over an already cached manifest rewrites the same
  /// content. Returns the number of stored assets.
  pub async fn install(&self) -> Result<usize, CacheError> {
    info!(
      generation = %self.generation,
      assets = self.manifest.len(),
      "Caching core assets"
    );

    let entries = try_join_all(self.manifest.iter().map(|path| self.fetch_asset(path))).await?;

    // The batch write creates the generation, so a failed install leaves none behind.
    self
      .store
      .handle(&self.generation)
      .put_all(&entries)
      .map_err(CacheError::Storage)?;

    info!(generation = %self.generation, "Core assets cached");
    Ok(entries.len())
  }

  /// First manifest path not yet stored in the generation, if any.
  pub fn missing_asset(&self) -> Result<Option<String>, CacheError> {
    let generation = self.store.handle(&self.generation);

    for path in self.manifest.iter() {
      let url = self.origin.join(path).map_err(|e| CacheError::Precache {
        path: path.to_string(),
        reason: format!("invalid asset path: {}", e),
      })?;
      let entry = generation
        .lookup(&Request::get(url))
        .map_err(CacheError::Storage)?;
      if entry.is_none() {
        return Ok(Some(path.to_string()));
      }
    }

    Ok(None)
  }

  async fn fetch_asset(&self, path: &str) -> Result<(RequestKey, Response), CacheError> {
    let url = self.origin.join(path).map_err(|e| CacheError::Precache {
      path: path.to_string(),
      reason: format!("invalid asset path: {}", e),
    })?;
    let request = Request::get(url);

    let response = self
      .network
      .fetch(&request)
      .await
      .map_err(|e| CacheError::Precache {
        path: path.to_string(),
        reason: e.to_string(),
      })?;

    if !response.is_success() {
      return Err(CacheError::Precache {
        path: path.to_string(),
        reason: format!("server responded with status {}", response.status),
      });
    }

    debug!(path, status = response.status, "Fetched core asset");
    Ok((request.key(), response))
  }
}
