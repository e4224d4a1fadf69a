//! Lifecycle controller: the handlers a host invokes for install, activate,
//! fetch and sync signals.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheResult, CacheStorage, CacheStore};
use crate::config::Config;
use crate::error::LifecycleError;
use crate::generation::{ActivationReport, GenerationManager};
use crate::network::Network;
use crate::precache::PrecacheLoader;
use crate::request::{Request, Response};
use crate::router::Router;
use crate::strategy::StrategyEngine;

/// Tag of the background sync signal the app registers.
pub const SYNC_TAG: &str = "hike-data-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  /// Installed, waiting for older versions to release their clients
  Waiting,
  Activating,
  Active,
  /// Install failed; this version never takes over
  Redundant,
}

impl std::fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      LifecycleState::Installing => "installing",
      LifecycleState::Waiting => "waiting",
      LifecycleState::Activating => "activating",
      LifecycleState::Active => "active",
      LifecycleState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  Acknowledged,
  Ignored,
}

/// Host hooks for taking control of open clients.
pub trait ClientControl: Send + Sync {
  /// Serve every open client from this version without a reload.
  fn claim_all_clients(&self);

  /// Ask the host to activate this version without waiting for old clients to close.
  fn skip_waiting(&self);
}

pub struct Lifecycle<S: CacheStorage, N: Network, C: ClientControl> {
  state: Mutex<LifecycleState>,
  /// Held for the whole of install, resume and activate so that only one
  /// of them checks and moves the state at a time.
  transition: tokio::sync::Mutex<()>,
  loader: PrecacheLoader<S, N>,
  generations: GenerationManager<S>,
  router: Router,
  engine: StrategyEngine<S, N>,
  clients: C,
  skip_waiting: bool,
}

impl<S: CacheStorage, N: Network, C: ClientControl> Lifecycle<S, N, C> {
  pub fn new(
    loader: PrecacheLoader<S, N>,
    generations: GenerationManager<S>,
    router: Router,
    engine: StrategyEngine<S, N>,
    clients: C,
  ) -> Self {
    Self {
      state: Mutex::new(LifecycleState::Installing),
      transition: tokio::sync::Mutex::new(()),
      loader,
      generations,
      router,
      engine,
      clients,
      skip_waiting: true,
    }
  }

  /// Wire every component for the configured version.
  pub fn assemble(
    config: &Config,
    store: CacheStore<S>,
    network: Arc<N>,
    clients: C,
  ) -> color_eyre::Result<Self> {
    let origin = config.origin_url()?;
    let manifest = config.manifest();
    let current = store.handle(&config.cache_name);

    let loader = PrecacheLoader::new(
      store.clone(),
      Arc::clone(&network),
      origin,
      config.cache_name.clone(),
      manifest.clone(),
    );
    let generations = GenerationManager::new(store, config.cache_name.clone());
    let router = Router::new(manifest, config.api_prefix.clone());
    let engine = StrategyEngine::new(current, network);

    let lifecycle = Self::new(loader, generations, router, engine, clients);
    Ok(lifecycle.with_skip_waiting(config.skip_waiting))
  }

  /// Whether a successful install requests immediate activation.
  pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
    self.skip_waiting = skip_waiting;
    self
  }

  pub fn state(&self) -> LifecycleState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, state: LifecycleState) {
    debug!(%state, "Lifecycle transition");
    *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
  }

  /// Install signal: precache the manifest.
  ///
  /// On failure this version becomes redundant and whatever version was
  /// active before keeps serving.
  pub async fn on_install(&self) -> Result<LifecycleState, LifecycleError> {
    let _transition = self.transition.lock().await;
    let state = self.state();
    if state != LifecycleState::Installing {
      return Err(LifecycleError::InvalidTransition {
        event: "install",
        state,
      });
    }

    info!("Installing");
    match self.loader.install().await {
      Ok(_) => {
        if self.skip_waiting {
          self.clients.skip_waiting();
          self.set_state(LifecycleState::Activating);
        } else {
          self.set_state(LifecycleState::Waiting);
        }
        Ok(self.state())
      }
      Err(e) => {
        error!(error = %e, "Failed to cache core assets");
        self.set_state(LifecycleState::Redundant);
        Err(LifecycleError::Install(e))
      }
    }
  }

  /// Pick up a version installed by an earlier run.
  ///
  /// Succeeds only if every manifest asset is already in the current
  /// generation; the version then waits for activation as after `on_install`.
  pub fn resume(&self) -> Result<LifecycleState, LifecycleError> {
    let transition = self.transition.try_lock();
    let state = self.state();
    if transition.is_err() || state != LifecycleState::Installing {
      return Err(LifecycleError::InvalidTransition {
        event: "resume",
        state,
      });
    }

    if let Some(path) = self.loader.missing_asset()? {
      return Err(LifecycleError::NotInstalled {
        generation: self.generations.current().to_string(),
        path,
      });
    }

    self.set_state(LifecycleState::Waiting);
    Ok(LifecycleState::Waiting)
  }

  /// Activate signal: sweep stale generations, then claim every client.
  ///
  /// Claiming happens once every deletion has settled, whatever the outcome.
  pub async fn on_activate(&self) -> Result<ActivationReport, LifecycleError> {
    let _transition = self.transition.lock().await;
    let state = self.state();
    if !matches!(state, LifecycleState::Waiting | LifecycleState::Activating) {
      return Err(LifecycleError::InvalidTransition {
        event: "activate",
        state,
      });
    }

    info!("Activating");
    self.set_state(LifecycleState::Activating);

    let report = self.generations.activate().await.unwrap_or_else(|e| {
      warn!(error = %e, "Could not enumerate cache generations");
      ActivationReport {
        deleted: Vec::new(),
        failed: vec![e],
      }
    });

    self.clients.claim_all_clients();
    self.set_state(LifecycleState::Active);
    info!("Activated and old caches cleaned");

    Ok(report)
  }

  /// Fetch signal: classify and run the lane's strategy.
  ///
  /// Only an active version serves requests. Until then, and forever after a
  /// failed install, the request is refused and left to the previous version.
  pub async fn on_fetch(
    &self,
    request: &Request,
  ) -> Result<CacheResult<Response>, LifecycleError> {
    let state = self.state();
    if state != LifecycleState::Active {
      debug!(url = %request.url, %state, "Not active, refusing request");
      return Err(LifecycleError::InvalidTransition {
        event: "fetch",
        state,
      });
    }

    let lane = self.router.classify(&request.url);
    debug!(url = %request.url, %lane, "Routing request");
    Ok(self.engine.handle(lane, request).await?)
  }

  /// Sync signal. The app's tag is acknowledged; queued writes are replayed
  /// by the client, not here.
  pub fn on_sync(&self, tag: &str) -> SyncOutcome {
    if tag == SYNC_TAG {
      info!(tag, "Sync event received");
      SyncOutcome::Acknowledged
    } else {
      debug!(tag, "Ignoring unknown sync tag");
      SyncOutcome::Ignored
    }
  }

  pub fn router(&self) -> &Router {
    &self.router
  }

  pub fn current_generation(&self) -> &str {
    self.generations.current()
  }
}
