//! Request classification into caching lanes.

use url::Url;

use crate::precache::Manifest;

/// Default prefix for API requests handled network-first.
pub const DEFAULT_API_PREFIX: &str = "/api/";

/// The lane a request falls into, which decides its strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
  /// Path is in the precache manifest: cache-first
  CorePrecached,
  /// Path is under the API prefix: network-first with cache fallback
  ApiNetworkFirst,
  /// Anything else: network only
  Default,
}

impl std::fmt::Display for Lane {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Lane::CorePrecached => "core (cache-first)",
      Lane::ApiNetworkFirst => "api (network-first)",
      Lane::Default => "default (network-only)",
    };
    f.write_str(name)
  }
}

/// Ordered rule set; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct Router {
  manifest: Manifest,
  api_prefix: String,
}

impl Router {
  pub fn new(manifest: Manifest, api_prefix: impl Into<String>) -> Self {
    Self {
      manifest,
      api_prefix: api_prefix.into(),
    }
  }

  /// Classify a request URL. Only the path takes part; origin, query and
  /// fragment are ignored.
  pub fn classify(&self, url: &Url) -> Lane {
    let path = url.path();

    if self.manifest.contains(path) {
      Lane::CorePrecached
    } else if path.starts_with(&self.api_prefix) {
      Lane::ApiNetworkFirst
    } else {
      Lane::Default
    }
  }

  pub fn manifest(&self) -> &Manifest {
    &self.manifest
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn router() -> Router {
    Router::new(Manifest::default(), DEFAULT_API_PREFIX)
  }

  fn classify(router: &Router, url: &str) -> Lane {
    router.classify(&Url::parse(url).unwrap())
  }

  #[test]
  fn test_manifest_paths_are_core() {
    let r = router();
    assert_eq!(classify(&r, "http://localhost:8196/index.html"), Lane::CorePrecached);
    assert_eq!(classify(&r, "http://localhost:8196/favicon.ico"), Lane::CorePrecached);
    assert_eq!(classify(&r, "http://localhost:8196/waiver.txt"), Lane::CorePrecached);
  }

  #[test]
  fn test_manifest_match_is_exact() {
    let r = router();
    assert_eq!(classify(&r, "http://localhost:8196/"), Lane::Default);
    assert_eq!(classify(&r, "http://localhost:8196/index.html/x"), Lane::Default);
    assert_eq!(classify(&r, "http://localhost:8196/INDEX.html"), Lane::Default);
  }

  #[test]
  fn test_query_and_fragment_are_ignored() {
    let r = router();
    assert_eq!(
      classify(&r, "http://localhost:8196/index.html?v=2#top"),
      Lane::CorePrecached
    );
    assert_eq!(
      classify(&r, "http://localhost:8196/api/hike?userUUID=abc"),
      Lane::ApiNetworkFirst
    );
  }

  #[test]
  fn test_api_prefix() {
    let r = router();
    assert_eq!(classify(&r, "http://localhost:8196/api/hike"), Lane::ApiNetworkFirst);
    assert_eq!(
      classify(&r, "http://localhost:8196/api/hike/abc/participant"),
      Lane::ApiNetworkFirst
    );
    assert_eq!(classify(&r, "http://localhost:8196/api"), Lane::Default);
    assert_eq!(classify(&r, "http://localhost:8196/apiary"), Lane::Default);
  }

  #[test]
  fn test_manifest_rule_wins_over_api_prefix() {
    let manifest = Manifest::new(vec!["/api/trailhead".to_string()]);
    let r = Router::new(manifest, DEFAULT_API_PREFIX);
    assert_eq!(
      classify(&r, "http://localhost:8196/api/trailhead"),
      Lane::CorePrecached
    );
    assert_eq!(classify(&r, "http://localhost:8196/api/hike"), Lane::ApiNetworkFirst);
  }

  #[test]
  fn test_other_origins_use_path_only() {
    let r = router();
    assert_eq!(classify(&r, "https://cdn.example.com/logo.png"), Lane::Default);
  }
}
