//! Removal of stale cache generations on activation.

use futures::future::join_all;
use tracing::{info, warn};

use crate::cache::{CacheStorage, CacheStore};
use crate::error::CacheError;

/// Outcome of an activation sweep.
#[derive(Debug, Default)]
pub struct ActivationReport {
  /// Generations that were removed
  pub deleted: Vec<String>,
  /// Generations that could not be removed
  pub failed: Vec<CacheError>,
}

impl ActivationReport {
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Owns the name of the current generation and sweeps every other one.
pub struct GenerationManager<S: CacheStorage> {
  store: CacheStore<S>,
  current: String,
}

impl<S: CacheStorage> GenerationManager<S> {
  pub fn new(store: CacheStore<S>, current: impl Into<String>) -> Self {
    Self {
      store,
      current: current.into(),
    }
  }

  pub fn current(&self) -> &str {
    &self.current
  }

  /// Delete every generation except the current one.
  ///
  /// Every stale generation gets its own deletion and activation waits for
  /// all of them to settle. The store calls are synchronous, so they run one
  /// after another; a failure is recorded and never stops the rest.
  pub async fn activate(&self) -> Result<ActivationReport, CacheError> {
    let names = self.store.list().map_err(CacheError::Storage)?;

    let stale = names.into_iter().filter(|name| *name != self.current);
    let outcomes = join_all(stale.map(|name| async move {
      info!(generation = %name, "Deleting old cache");
      let outcome = self.store.delete(&name);
      (name, outcome)
    }))
    .await;

    let mut report = ActivationReport::default();
    for (name, outcome) in outcomes {
      match outcome {
        Ok(_) => report.deleted.push(name),
        Err(e) => {
          warn!(generation = %name, error = %e, "Failed to delete old cache");
          report.failed.push(CacheError::GenerationDelete {
            name,
            reason: e.to_string(),
          });
        }
      }
    }

    info!(
      current = %self.current,
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "Old caches cleaned"
    );
    Ok(report)
  }
}
