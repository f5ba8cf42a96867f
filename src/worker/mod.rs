//! The request-intercepting worker.
//!
//! A `Worker` owns a cache store and a fetcher and reacts to the events the
//! hosting runtime delivers:
//! - `install` / `activate` / `message` drive the cache generation lifecycle
//! - `fetch` routes each request to cache-first or network-first fulfillment,
//!   or declines it so the runtime performs it unmodified
//!
//! All handlers run on the task that calls [`Worker::run`]. They interleave
//! at await points but never run in parallel.

mod lifecycle;
mod offline;
mod router;
mod strategy;

#[cfg(test)]
mod testing;

use std::cell::Cell;

use color_eyre::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::{CacheStore, GenerationNames};
use crate::config::{Config, Manifest};
use crate::event::WorkerEvent;
use crate::net::{Fetcher, Request, Response};

pub use lifecycle::{ClientMessage, InstallError, InstallReport, LifecycleError, WorkerState};
pub use router::{PassReason, Route, Router};

/// What the worker did with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
  /// The worker produced this response
  Respond(Response),
  /// Not intercepted; the runtime should perform the request itself
  Passthrough(PassReason),
}

/// A generation as seen from the current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
  pub name: String,
  pub entries: usize,
  pub current: bool,
}

pub struct Worker<S, F> {
  store: S,
  fetcher: F,
  router: Router,
  manifest: Manifest,
  generations: GenerationNames,
  state: Cell<WorkerState>,
  skip_waiting: Cell<bool>,
  clients_claimed: Cell<bool>,
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  pub fn new(store: S, fetcher: F, config: &Config) -> Result<Self> {
    let manifest = config.manifest()?;
    Ok(Self::with_manifest(
      store,
      fetcher,
      manifest,
      config.generations.clone(),
    ))
  }

  pub fn with_manifest(
    store: S,
    fetcher: F,
    manifest: Manifest,
    generations: GenerationNames,
  ) -> Self {
    Self {
      store,
      fetcher,
      router: Router::new(&manifest),
      manifest,
      generations,
      state: Cell::new(WorkerState::Parsed),
      skip_waiting: Cell::new(false),
      clients_claimed: Cell::new(false),
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn state(&self) -> WorkerState {
    self.state.get()
  }

  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed.get()
  }

  /// Every generation in the store, flagged current or stale.
  pub fn generations(&self) -> Result<Vec<GenerationSummary>> {
    self
      .store
      .list_names()?
      .into_iter()
      .map(|name| {
        Ok(GenerationSummary {
          entries: self.store.entry_count(&name)?,
          current: self.generations.is_current(&name),
          name,
        })
      })
      .collect()
  }

  /// Handle one intercepted request.
  pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
    match self.router.classify(&request.method, &request.url) {
      Route::Passthrough(reason) => {
        debug!(url = %request.url, method = %request.method, %reason, "not intercepting");
        FetchOutcome::Passthrough(reason)
      }
      Route::CacheFirst => FetchOutcome::Respond(self.cache_first(request).await),
      Route::NetworkFirst => FetchOutcome::Respond(self.network_first(request).await),
    }
  }

  /// Process events until every handle is dropped and in-flight handlers finish.
  pub async fn run(&self, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    let mut in_flight = FuturesUnordered::new();

    loop {
      tokio::select! {
        event = events.recv() => match event {
          Some(event) => in_flight.push(self.handle(event)),
          None => break,
        },
        Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
      }
    }

    while in_flight.next().await.is_some() {}
    debug!("event channel closed, worker idle");
  }

  async fn handle(&self, event: WorkerEvent) {
    // A dropped reply receiver means the runtime stopped waiting; nothing to do.
    match event {
      WorkerEvent::Install { done } => {
        let _ = done.send(self.install().await);
      }
      WorkerEvent::Activate { done } => {
        let _ = done.send(self.activate().await);
      }
      WorkerEvent::Fetch {
        request,
        respond_with,
      } => {
        let _ = respond_with.send(self.handle_fetch(&request).await);
      }
      WorkerEvent::Message { payload, done } => {
        let _ = done.send(self.message(payload).await);
      }
    }
  }
}
