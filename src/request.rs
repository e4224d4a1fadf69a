//! Request and response snapshots passed between the router, the strategies
//! and the cache store.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Body of the response synthesized when an API read is offline and uncached.
pub const OFFLINE_ERROR_MESSAGE: &str = "Offline and data not available in cache";

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  /// Path component used for lane classification.
  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Safe methods have no side effects and may be answered with a
  /// synthesized offline response.
  pub fn is_read(&self) -> bool {
    self.method.is_safe()
  }

  /// Only GET requests are written to or matched against a generation.
  pub fn is_cacheable(&self) -> bool {
    self.method == Method::GET
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Normalized request identity used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_ascii_uppercase(),
      url: url.into(),
    }
  }

  /// Stable, fixed-length hash used as the storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response snapshot: what the network returned or what the store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// 2xx status.
  pub fn is_success(&self) -> bool {
    (200..=299).contains(&self.status)
  }

  /// Case-insensitive header lookup (first match).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// 503 returned for API reads that are offline and not cached.
  pub fn offline() -> Self {
    let body = serde_json::json!({ "error": OFFLINE_ERROR_MESSAGE }).to_string();
    Self::new(503, body).with_header("Content-Type", "application/json")
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_key_ignores_fragment_but_keeps_query() {
    let a = RequestKey::new(&Method::GET, &url("http://localhost/api/hike?id=1#top"));
    let b = RequestKey::new(&Method::GET, &url("http://localhost/api/hike?id=1"));
    let c = RequestKey::new(&Method::GET, &url("http://localhost/api/hike?id=2"));

    assert_eq!(a, b);
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_ne!(a.cache_hash(), c.cache_hash());
  }

  #[test]
  fn test_key_includes_method() {
    let u = url("http://localhost/api/hike");
    let get = RequestKey::new(&Method::GET, &u);
    let post = RequestKey::new(&Method::POST, &u);

    assert_ne!(get.cache_hash(), post.cache_hash());
    assert_eq!(get.to_string(), "GET http://localhost/api/hike");
  }

  #[test]
  fn test_read_and_cacheable_methods() {
    let u = url("http://localhost/api/hike");

    assert!(Request::get(u.clone()).is_read());
    assert!(Request::new(Method::HEAD, u.clone()).is_read());
    assert!(!Request::new(Method::POST, u.clone()).is_read());
    assert!(!Request::new(Method::DELETE, u.clone()).is_read());

    assert!(Request::get(u.clone()).is_cacheable());
    assert!(!Request::new(Method::HEAD, u).is_cacheable());
  }

  #[test]
  fn test_offline_response() {
    let response = Response::offline();

    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(
      response.body_text(),
      r#"{"error":"Offline and data not available in cache"}"#
    );
    assert!(!response.is_success());
  }
}
