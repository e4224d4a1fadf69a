use thiserror::Error;

/// Failures inside the cache engine itself.
#[derive(Debug, Error)]
pub enum CacheError {
  /// A manifest asset could not be fetched or stored. Fatal to install.
  #[error("failed to precache {path}: {reason}")]
  Precache { path: String, reason: String },

  /// A stale generation could not be removed. Never fatal.
  #[error("failed to delete cache generation {name}: {reason}")]
  GenerationDelete { name: String, reason: String },

  #[error("cache storage error: {0}")]
  Storage(color_eyre::Report),
}

/// The network could not produce a response at all.
///
/// A reachable server answering with an error status is not a transport
/// failure; that response is handed back unchanged.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("network unavailable (offline) for {url}")]
  Offline { url: String },

  #[error("connection to {url} failed: {message}")]
  Connect { url: String, message: String },

  #[error("request to {url} timed out")]
  Timeout { url: String },

  #[error("failed to read response body from {url}: {message}")]
  Body { url: String, message: String },

  #[error("request to {url} failed: {message}")]
  Other { url: String, message: String },
}

/// Lifecycle signals delivered in the wrong order, an install that did not
/// complete, or a fetch that failed outright.
#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("install failed: {0}")]
  Install(#[from] CacheError),

  #[error("{generation} is not installed: {path} is missing from the cache")]
  NotInstalled { generation: String, path: String },

  /// The strategy for a request could not produce a response.
  #[error(transparent)]
  Fetch(#[from] TransportError),

  #[error("cannot handle {event} while {state}")]
  InvalidTransition {
    event: &'static str,
    state: crate::lifecycle::LifecycleState,
  },
}
