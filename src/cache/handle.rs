//! Named handles over a [`CacheStorage`] backend.

use color_eyre::Result;
use std::sync::Arc;

use super::storage::{CacheStorage, CachedEntry};
use crate::request::{Request, RequestKey, Response};

/// Entry point to the store: open, list and delete generations.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  pub fn from_shared(storage: Arc<S>) -> Self {
    Self { storage }
  }

  /// Open a generation, creating it if absent.
  pub fn open(&self, name: &str) -> Result<Generation<S>> {
    self.storage.open_generation(name)?;
    Ok(self.handle(name))
  }

  /// Handle to a generation without creating it. Lookups on an absent
  /// generation miss; the first write creates it.
  pub fn handle(&self, name: &str) -> Generation<S> {
    Generation {
      storage: Arc::clone(&self.storage),
      name: name.to_string(),
    }
  }

  pub fn list(&self) -> Result<Vec<String>> {
    self.storage.generation_names()
  }

  pub fn delete(&self, name: &str) -> Result<bool> {
    self.storage.delete_generation(name)
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// One named generation of cached responses.
pub struct Generation<S: CacheStorage> {
  storage: Arc<S>,
  name: String,
}

impl<S: CacheStorage> Generation<S> {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Find the stored response for a request. Non-GET requests always miss.
  pub fn lookup(&self, request: &Request) -> Result<Option<CachedEntry>> {
    if !request.is_cacheable() {
      return Ok(None);
    }
    self.storage.get_entry(&self.name, &request.key())
  }

  /// Store a response for a GET request. Other methods are ignored.
  pub fn put(&self, request: &Request, response: &Response) -> Result<()> {
    if !request.is_cacheable() {
      return Ok(());
    }
    self.storage.store_entry(&self.name, &request.key(), response)
  }

  /// Store a batch of responses in one all-or-nothing write.
  pub fn put_all(&self, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.storage.store_entries(&self.name, entries)
  }

  pub fn entry_count(&self) -> Result<usize> {
    self.storage.entry_count(&self.name)
  }
}

impl<S: CacheStorage> Clone for Generation<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      name: self.name.clone(),
    }
  }
}
