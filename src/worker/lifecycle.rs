//! Install, activate and client-message handling.

use std::future::Future;

use futures::future::{join_all, try_join_all};
use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use super::Worker;
use crate::cache::{CacheStore, RequestIdentity};
use crate::net::{Fetcher, Request, Response};

/// Lifecycle state of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Created, no lifecycle event handled yet
  Parsed,
  Installing,
  /// Installed and waiting to take over
  Installed,
  Activating,
  /// Controlling clients
  Activated,
  /// Install failed; this instance will never activate
  Redundant,
}

/// Summary of a successful install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  /// Static resources stored
  pub precached: usize,
  /// Bundle resources stored
  pub bundled: usize,
  /// Bundle resources that could not be fetched or stored
  pub bundle_failures: usize,
  /// The instance asked to take over without waiting for old clients
  pub skip_waiting: bool,
}

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("required asset {url} could not be cached: {reason}")]
  RequiredAsset { url: Url, reason: String },

  #[error("cache generation {generation} is unavailable: {reason}")]
  Store { generation: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
  #[error("worker cannot activate from state {0:?}")]
  NotInstalled(WorkerState),
}

/// Control messages the application can post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Take over now instead of waiting for every client to close
  SkipWaiting,
  #[serde(other)]
  Unknown,
}

impl ClientMessage {
  /// Decode a JSON payload such as `{"type": "SKIP_WAITING"}`.
  ///
  /// Anything unrecognised, including malformed JSON, is `Unknown`.
  pub fn from_json(payload: &str) -> Self {
    serde_json::from_str(payload).unwrap_or(Self::Unknown)
  }
}

/// Outcome of one item of a best-effort batch.
#[derive(Debug)]
pub struct Settled<K, T, E> {
  pub key: K,
  pub outcome: Result<T, E>,
}

/// Run every future to completion and collect each outcome.
///
/// Unlike `try_join_all`, one failure neither cancels the others nor fails
/// the batch.
pub async fn settle_all<K, T, E, Fut>(items: impl IntoIterator<Item = (K, Fut)>) -> Vec<Settled<K, T, E>>
where
  Fut: Future<Output = Result<T, E>>,
{
  join_all(
    items
      .into_iter()
      .map(|(key, fut)| async move { Settled { key, outcome: fut.await } }),
  )
  .await
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  /// Populate the static and bundle generations.
  ///
  /// Any static resource failing fails the install and leaves the instance
  /// `Redundant`. Bundle failures are logged and skipped.
  pub async fn install(&self) -> Result<InstallReport, InstallError> {
    self.state.set(WorkerState::Installing);
    info!(
      static_generation = %self.generations.static_assets,
      bundle_generation = %self.generations.bundle,
      "installing"
    );

    let (precached, (bundled, bundle_failures)) =
      futures::join!(self.precache_static(), self.precache_bundle());

    let precached = match precached {
      Ok(count) => count,
      Err(e) => {
        error!(error = %e, "install failed");
        self.state.set(WorkerState::Redundant);
        return Err(e);
      }
    };

    self.skip_waiting();
    self.state.set(WorkerState::Installed);
    info!(precached, bundled, bundle_failures, "install complete");

    Ok(InstallReport {
      precached,
      bundled,
      bundle_failures,
      skip_waiting: self.skip_waiting.get(),
    })
  }

  /// Delete stale generations and take control of all clients.
  ///
  /// Failed deletions are logged and do not stop activation.
  pub async fn activate(&self) -> Result<(), LifecycleError> {
    let state = self.state.get();
    if state != WorkerState::Installed {
      return Err(LifecycleError::NotInstalled(state));
    }

    self.state.set(WorkerState::Activating);
    info!("activating");

    let names = self.store.list_names().unwrap_or_else(|e| {
      warn!(error = %e, "could not list cache generations, skipping cleanup");
      Vec::new()
    });

    for name in names.iter().filter(|n| !self.generations.is_current(n)) {
      match self.store.delete(name) {
        Ok(_) => info!(generation = %name, "deleted stale generation"),
        Err(e) => warn!(generation = %name, error = %e, "failed to delete stale generation"),
      }
    }

    self.clients_claimed.set(true);
    self.state.set(WorkerState::Activated);
    info!("activation complete, clients claimed");

    Ok(())
  }

  /// Handle a client message. Returns whether the worker now wants activation.
  pub async fn message(&self, message: ClientMessage) -> bool {
    match message {
      ClientMessage::SkipWaiting => {
        info!("skip-waiting requested by client");
        self.skip_waiting();
      }
      ClientMessage::Unknown => debug!("ignoring unknown client message"),
    }

    self.should_activate()
  }

  /// Installed and allowed to supersede the running instance.
  pub fn should_activate(&self) -> bool {
    self.state.get() == WorkerState::Installed && self.skip_waiting.get()
  }

  pub fn skip_waiting(&self) {
    self.skip_waiting.set(true);
  }

  /// Pick up an install completed by an earlier run.
  ///
  /// The install counts as complete only when the static generation holds
  /// every static resource. An empty or partial static generation left by a
  /// failed install does not qualify.
  pub fn resume(&self) -> color_eyre::Result<bool> {
    let generation = &self.generations.static_assets;
    if !self.store.list_names()?.iter().any(|n| n == generation) {
      return Ok(false);
    }

    for url in &self.manifest.static_resources {
      let identity = RequestIdentity::new(Method::GET, url);
      if self.store.get(generation, &identity)?.is_none() {
        debug!(generation = %generation, url = %url, "static generation incomplete, not resuming");
        return Ok(false);
      }
    }

    if self.state.get() == WorkerState::Parsed {
      self.state.set(WorkerState::Installed);
    }

    Ok(true)
  }

  async fn precache_static(&self) -> Result<usize, InstallError> {
    let generation = &self.generations.static_assets;
    let store_error = |e: color_eyre::Report| InstallError::Store {
      generation: generation.clone(),
      reason: e.to_string(),
    };

    // Fetch everything before the generation exists.
    let fetched = try_join_all(self.manifest.static_resources.iter().map(|url| async move {
      self
        .fetch_ok(url)
        .await
        .map(|response| (url, response))
        .map_err(|reason| InstallError::RequiredAsset {
          url: url.clone(),
          reason,
        })
    }))
    .await?;

    self.store.open(generation).map_err(store_error)?;
    for (url, response) in &fetched {
      self
        .store
        .put(generation, &RequestIdentity::new(Method::GET, url), response)
        .map_err(store_error)?;
    }

    info!(generation = %generation, count = fetched.len(), "precached static resources");
    Ok(fetched.len())
  }

  /// Returns (stored, failed).
  async fn precache_bundle(&self) -> (usize, usize) {
    let generation = &self.generations.bundle;
    let total = self.manifest.bundle_resources.len();

    if let Err(e) = self.store.open(generation) {
      warn!(generation = %generation, error = %e, "could not open bundle generation");
      return (0, total);
    }

    let settled = settle_all(
      self
        .manifest
        .bundle_resources
        .iter()
        .map(|url| (url, self.store_bundle(generation, url))),
    )
    .await;

    let mut failed = 0;
    for item in &settled {
      if let Err(reason) = &item.outcome {
        warn!(url = %item.key, %reason, "could not cache bundle resource");
        failed += 1;
      }
    }

    info!(generation = %generation, stored = total - failed, failed, "bundle precache settled");
    (total - failed, failed)
  }

  async fn store_bundle(&self, generation: &str, url: &Url) -> Result<(), String> {
    let response = self.fetch_ok(url).await?;
    self
      .store
      .put(generation, &RequestIdentity::new(Method::GET, url), &response)
      .map_err(|e| e.to_string())
  }

  /// GET `url`, accepting only a successful status.
  async fn fetch_ok(&self, url: &Url) -> Result<Response, String> {
    match self.fetcher.fetch(&Request::get(url.clone())).await {
      Ok(response) if response.is_success() => Ok(response),
      Ok(response) => Err(format!("unexpected status {}", response.status)),
      Err(e) => Err(e.to_string()),
    }
  }
}
