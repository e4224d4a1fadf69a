//! Strategy engine: cache-first, network-first and network-only handling
//! over the current generation.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheResult, CacheStorage, Generation};
use crate::error::TransportError;
use crate::network::Network;
use crate::request::{Request, Response};
use crate::router::Lane;

/// Runs the strategy matching a request's lane.
///
/// Only one failure ever leaves the engine: a transport failure on a
/// mutating API request with nothing cached. Everything else resolves to a
/// response.
pub struct StrategyEngine<S: CacheStorage, N: Network> {
  generation: Generation<S>,
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> StrategyEngine<S, N> {
  pub fn new(generation: Generation<S>, network: Arc<N>) -> Self {
    Self {
      generation,
      network,
    }
  }

  pub async fn handle(
    &self,
    lane: Lane,
    request: &Request,
  ) -> Result<CacheResult<Response>, TransportError> {
    match lane {
      Lane::CorePrecached => self.cache_first(request).await,
      Lane::ApiNetworkFirst => self.network_first(request).await,
      Lane::Default => self.network_only(request).await,
    }
  }

  /// Serve from the current generation; on a miss go to the network.
  ///
  /// A miss here means precaching did not cover the asset. The network
  /// response is returned without being written back.
  pub async fn cache_first(
    &self,
    request: &Request,
  ) -> Result<CacheResult<Response>, TransportError> {
    match self.generation.lookup(request) {
      Ok(Some(entry)) => {
        debug!(url = %request.url, "Serving core asset from cache");
        return Ok(CacheResult::from_cache(entry.response, entry.cached_at));
      }
      Ok(None) => {
        warn!(url = %request.url, "Core asset not in cache, falling back to network");
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Cache lookup failed, falling back to network");
      }
    }

    let response = self.network.fetch(request).await?;
    Ok(CacheResult::from_network(response))
  }

  /// Try the network first and keep a copy of successful responses.
  ///
  /// 1. Success status: store a copy, return it
  /// 2. Error status: return as-is, never stored
  /// 3. Transport failure: serve the cached copy if present
  /// 4. Nothing cached: reads get a synthesized 503, mutations get the error
  pub async fn network_first(
    &self,
    request: &Request,
  ) -> Result<CacheResult<Response>, TransportError> {
    let err = match self.network.fetch(request).await {
      Ok(response) if response.is_success() => {
        info!(url = %request.url, "API call successful, caching response");
        if let Err(e) = self.generation.put(request, &response) {
          warn!(url = %request.url, error = %e, "Failed to cache API response");
        }
        return Ok(CacheResult::from_network(response));
      }
      Ok(response) => {
        info!(url = %request.url, status = response.status, "API call not OK, not caching");
        return Ok(CacheResult::from_network(response));
      }
      Err(e) => e,
    };

    warn!(url = %request.url, error = %err, "Network fetch failed for API call, trying cache");

    let cached = self.generation.lookup(request).unwrap_or_else(|e| {
      warn!(url = %request.url, error = %e, "Cache lookup failed");
      None
    });

    if let Some(entry) = cached {
      info!(url = %request.url, "Serving API call from cache");
      return Ok(CacheResult::offline(entry.response, entry.cached_at));
    }

    error!(
      url = %request.url,
      method = %request.method,
      "API call not in cache and network failed"
    );
    if request.is_read() {
      Ok(CacheResult::synthesized(Response::offline()))
    } else {
      Err(err)
    }
  }

  /// Pass straight through to the network.
  pub async fn network_only(
    &self,
    request: &Request,
  ) -> Result<CacheResult<Response>, TransportError> {
    debug!(url = %request.url, "Fetching from network");
    let response = self.network.fetch(request).await?;
    Ok(CacheResult::from_network(response))
  }

  pub fn generation(&self) -> &Generation<S> {
    &self.generation
  }
}
