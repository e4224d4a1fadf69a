use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use hikecache::cache::{CacheStore, SqliteStorage};
use hikecache::config::Config;
use hikecache::generation::ActivationReport;
use hikecache::lifecycle::{ClientControl, Lifecycle, LifecycleState, SYNC_TAG};
use hikecache::network::HttpNetwork;
use hikecache::request::Request;

#[derive(Parser, Debug)]
#[command(name = "hikecache")]
#[command(about = "Offline-caching request engine for the hike tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./hikecache.yaml or $XDG_CONFIG_HOME/hikecache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache generation name, overriding the config file
  #[arg(long)]
  cache_name: Option<String>,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the asset manifest into the current generation
  Install,
  /// Delete stale generations and claim clients
  Activate,
  /// Install, then activate
  Start,
  /// Route one request through the engine
  Fetch {
    /// Absolute URL, or a path resolved against the origin
    target: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Fail every network request, as if disconnected
    #[arg(long)]
    offline: bool,
  },
  /// List stored generations
  Generations,
  /// Deliver a background sync signal
  Sync {
    #[arg(default_value = SYNC_TAG)]
    tag: String,
  },
}

/// Clients of a command-line host: nothing to hand over, so just log.
struct ConsoleClients;

impl ClientControl for ConsoleClients {
  fn claim_all_clients(&self) {
    info!("Claimed all clients");
  }

  fn skip_waiting(&self) {
    info!("Skipping wait for older versions");
  }
}

type Worker = Lifecycle<SqliteStorage, HttpNetwork, ConsoleClients>;

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let config = if let Some(cache_name) = args.cache_name {
    Config { cache_name, ..config }
  } else {
    config
  };

  let storage = match &config.database {
    Some(path) => SqliteStorage::open(path)?,
    None => SqliteStorage::open_default()?,
  };
  let store = CacheStore::new(storage);
  let network = Arc::new(HttpNetwork::new(config.timeout())?);
  let worker = Lifecycle::assemble(&config, store.clone(), Arc::clone(&network), ConsoleClients)?;

  match args.command {
    Command::Install => install(&worker).await?,
    Command::Activate => activate(&worker).await?,
    Command::Start => {
      install(&worker).await?;
      activate(&worker).await?;
    }
    Command::Fetch {
      target,
      method,
      data,
      offline,
    } => {
      network.set_offline(offline);
      if worker.state() == LifecycleState::Installing {
        let report = take_over(&worker).await?;
        for failure in &report.failed {
          warn!(error = %failure, "Stale generation left behind");
        }
      }

      let mut request = Request::new(parse_method(&method)?, resolve(&config, &target)?);
      if let Some(body) = data {
        request = request.with_body(body);
      }

      let lane = worker.router().classify(&request.url);
      let result = worker.on_fetch(&request).await?;
      println!("{} {} [{}, from {}]", request.method, request.url, lane, result.source);
      println!("status: {}", result.data.status);
      if let Some(cached_at) = result.cached_at {
        println!("cached at: {}", cached_at.to_rfc3339());
      }
      println!();
      println!("{}", result.data.body_text());
    }
    Command::Generations => {
      for name in store.list()? {
        let count = store.handle(&name).entry_count()?;
        let marker = if name == worker.current_generation() { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, count);
      }
    }
    Command::Sync { tag } => {
      println!("{:?}", worker.on_sync(&tag));
    }
  }

  Ok(())
}

async fn install(worker: &Worker) -> Result<()> {
  let state = worker.on_install().await?;
  println!("installed {} ({})", worker.current_generation(), state);
  Ok(())
}

/// Activate the configured version. A fresh process first picks up what an
/// earlier install stored, and fails if that install never completed.
async fn take_over(worker: &Worker) -> Result<ActivationReport> {
  if worker.state() == LifecycleState::Installing {
    worker.resume()?;
  }
  Ok(worker.on_activate().await?)
}

async fn activate(worker: &Worker) -> Result<()> {
  let report = take_over(worker).await?;
  for name in &report.deleted {
    println!("deleted {}", name);
  }
  for failure in &report.failed {
    println!("failed: {}", failure);
  }
  println!("active: {}", worker.current_generation());
  Ok(())
}

fn parse_method(method: &str) -> Result<reqwest::Method> {
  reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))
}

fn resolve(config: &Config, target: &str) -> Result<Url> {
  if let Ok(url) = Url::parse(target) {
    return Ok(url);
  }
  config
    .origin_url()?
    .join(target)
    .map_err(|e| eyre!("Invalid request target '{}': {}", target, e))
}

fn init_tracing(
  log_file: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
  let filter =
    EnvFilter::try_from_env("HIKECACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  let stderr = fmt::layer().with_writer(std::io::stderr);

  let Some(path) = log_file else {
    tracing_subscriber::registry().with(filter).with(stderr).init();
    return Ok(None);
  };

  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| std::path::Path::new("."));
  let name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
  tracing_subscriber::registry()
    .with(filter)
    .with(stderr)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Ok(Some(guard))
}
