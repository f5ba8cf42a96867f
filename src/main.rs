mod cache;
mod config;
mod event;
mod logging;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use reqwest::Method;
use std::path::PathBuf;
use tracing::{info, warn};
use url::Url;

use cache::{CacheStore, MemoryStore, SqliteStore};
use config::Config;
use event::WorkerHandle;
use net::{Destination, Fetcher, HttpFetcher, Request, Response};
use worker::{ClientMessage, FetchOutcome, Worker};

#[derive(Parser, Debug)]
#[command(name = "swguard")]
#[command(about = "Offline-first request interception with versioned cache generations")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swguard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Application origin (overrides config file)
  #[arg(long)]
  origin: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache resources, then activate
  Install,
  /// Delete stale cache generations and take control
  Activate,
  /// Send requests through the worker
  Fetch {
    /// Absolute URLs, or paths relative to the origin
    #[arg(required = true)]
    urls: Vec<String>,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    #[arg(short, long, value_enum, default_value_t = Destination::Fetch)]
    destination: Destination,

    /// Print response bodies
    #[arg(long)]
    body: bool,
  },
  /// Post a JSON control message, e.g. '{"type":"SKIP_WAITING"}'
  Message { payload: String },
  /// List cache generations
  Generations,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  if let Some(origin) = args.origin {
    config.origin = origin;
    config.validate()?;
  }

  let _log_guard = logging::init(config.log_file.as_deref())?;

  if config.storage.persist {
    let path = config.storage_path()?;
    info!(path = %path.display(), "using persistent cache");
    run(SqliteStore::open(&path)?, &config, args.command).await
  } else {
    run(MemoryStore::new(), &config, args.command).await
  }
}

async fn run<S: CacheStore>(store: S, config: &Config, command: Command) -> Result<()> {
  let fetcher = HttpFetcher::new(config.fetch_timeout())?;
  let network = fetcher.clone();
  let worker = Worker::new(store, fetcher, config)?;

  if let Command::Generations = command {
    for generation in worker.generations()? {
      println!(
        "{:<32} {:>6} {}",
        generation.name,
        generation.entries,
        if generation.current { "current" } else { "stale" }
      );
    }
    return Ok(());
  }

  if matches!(command, Command::Activate | Command::Message { .. }) {
    worker.resume()?;
  }

  let (handle, events) = WorkerHandle::channel();

  let driver = async move {
    let result = dispatch(&handle, &network, config, command).await;
    drop(handle);
    result
  };

  let (result, ()) = tokio::join!(driver, worker.run(events));
  info!(
    state = ?worker.state(),
    clients_claimed = worker.clients_claimed(),
    "worker idle"
  );
  result
}

/// Play the hosting runtime: deliver the event and act on the reply.
async fn dispatch(
  handle: &WorkerHandle,
  network: &HttpFetcher,
  config: &Config,
  command: Command,
) -> Result<()> {
  match command {
    Command::Install => {
      let report = handle.install().await?;
      println!(
        "installed: {} static, {} bundle ({} failed)",
        report.precached, report.bundled, report.bundle_failures
      );
      if report.skip_waiting {
        handle.activate().await?;
        println!("activated");
      }
    }
    Command::Activate => {
      handle.activate().await?;
      println!("activated");
    }
    Command::Message { payload } => {
      if handle.message(ClientMessage::from_json(&payload)).await? {
        handle.activate().await?;
        println!("activated");
      }
    }
    Command::Fetch {
      urls,
      method,
      destination,
      body,
    } => {
      let origin = config.manifest()?.origin;
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

      let requests = urls
        .iter()
        .map(|u| {
          origin
            .join(u)
            .map(|url| Request::new(method.clone(), url).with_destination(destination))
            .map_err(|e| eyre!("Invalid URL '{}': {}", u, e))
        })
        .collect::<Result<Vec<_>>>()?;

      let outcomes = join_all(requests.iter().map(|r| handle.fetch(r.clone()))).await;

      for (request, outcome) in requests.iter().zip(outcomes) {
        match outcome? {
          FetchOutcome::Respond(response) => print_response(&request.url, &response, body),
          FetchOutcome::Passthrough(reason) => {
            info!(url = %request.url, %reason, "passing through to network");
            match network.fetch(request).await {
              Ok(response) => print_response(&request.url, &response, body),
              Err(e) => {
                warn!(error = %e, "passthrough fetch failed");
                println!("ERR {}", e.url());
              }
            }
          }
        }
      }
    }
    Command::Generations => {}
  }

  Ok(())
}

fn print_response(url: &Url, response: &Response, body: bool) {
  let content_type = response
    .header("content-type")
    .map(String::from_utf8_lossy)
    .unwrap_or_default();
  println!(
    "{} {:<7} {:>8}B {} {}",
    response.status,
    response.source.to_string(),
    response.body.len(),
    url,
    content_type
  );
  if body {
    println!("{}", String::from_utf8_lossy(&response.body));
  }
}
