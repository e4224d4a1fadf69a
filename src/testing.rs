//! Test doubles shared by the unit tests.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::cache::{CacheStorage, CachedEntry, SqliteStorage};
use crate::error::TransportError;
use crate::network::Network;
use crate::request::{Request, RequestKey, Response};

pub const ORIGIN: &str = "http://localhost:8196";

pub fn request(method: Method, path: &str) -> Request {
  let url = Url::parse(ORIGIN).unwrap().join(path).unwrap();
  Request::new(method, url)
}

pub fn get(path: &str) -> Request {
  request(Method::GET, path)
}

/// Scripted network: canned responses per (method, path), an online switch
/// and a call counter. Unknown routes answer 404.
pub struct FakeNetwork {
  routes: Mutex<HashMap<(Method, String), Response>>,
  online: AtomicBool,
  calls: AtomicUsize,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
      calls: AtomicUsize::new(0),
    }
  }

  pub fn route(self, method: Method, path: &str, response: Response) -> Self {
    self.set_route(method, path, response);
    self
  }

  pub fn set_route(&self, method: Method, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert((method, path.to_string()), response);
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> std::result::Result<Response, TransportError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    // Suspend like a real fetch so concurrent handlers interleave.
    tokio::task::yield_now().await;

    if !self.online.load(Ordering::SeqCst) {
      return Err(TransportError::Offline {
        url: request.url.to_string(),
      });
    }

    let routes = self.routes.lock().unwrap();
    Ok(
      routes
        .get(&(request.method.clone(), request.path().to_string()))
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

/// In-memory storage that refuses to delete one named generation, or to
/// list generations at all.
pub struct StubbornStorage {
  inner: SqliteStorage,
  keep: Option<&'static str>,
  unlistable: bool,
}

impl StubbornStorage {
  pub fn refusing_delete(keep: &'static str) -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      keep: Some(keep),
      unlistable: false,
    }
  }

  pub fn unlistable() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      keep: None,
      unlistable: true,
    }
  }
}

impl CacheStorage for StubbornStorage {
  fn open_generation(&self, name: &str) -> Result<()> {
    self.inner.open_generation(name)
  }

  fn generation_names(&self) -> Result<Vec<String>> {
    if self.unlistable {
      return Err(eyre!("database is locked"));
    }
    self.inner.generation_names()
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    if self.keep == Some(name) {
      return Err(eyre!("disk is read-only"));
    }
    self.inner.delete_generation(name)
  }

  fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    self.inner.get_entry(generation, key)
  }

  fn store_entry(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.inner.store_entry(generation, key, response)
  }

  fn store_entries(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.inner.store_entries(generation, entries)
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    self.inner.entry_count(generation)
  }
}
