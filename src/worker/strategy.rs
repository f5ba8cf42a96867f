//! Cache-first and network-first fulfillment.
//!
//! Both strategies always produce a response. A failed network fetch falls
//! through to the cache or the offline fallback; a failing cache store is
//! treated as a miss.

use tracing::{debug, info, warn};

use super::offline::offline_response;
use super::Worker;
use crate::cache::{CacheStore, CachedResponse, RequestIdentity};
use crate::net::{Fetcher, Request, Response};

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  /// Serve from the current generations if possible, otherwise fetch.
  ///
  /// A hit never touches the network, however old the entry is.
  pub(crate) async fn cache_first(&self, request: &Request) -> Response {
    let identity = RequestIdentity::of(request);

    if let Some(hit) = self.lookup(&self.generations.current(), &identity) {
      debug!(url = %request.url, "served from cache");
      return hit;
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.remember(&identity, &response);
        response
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache miss and network failed, serving offline fallback");
        offline_response(request.destination)
      }
    }
  }

  /// Fetch first; fall back to any generation, then to the offline response.
  pub(crate) async fn network_first(&self, request: &Request) -> Response {
    let identity = RequestIdentity::of(request);

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.remember(&identity, &response);
        response
      }
      Err(e) => {
        info!(url = %request.url, error = %e, "network failed, trying cache");

        let names = self.store.list_names().unwrap_or_else(|e| {
          warn!(error = %e, "could not list cache generations");
          Vec::new()
        });

        match self.lookup(&names, &identity) {
          Some(hit) => hit,
          None => {
            warn!(url = %request.url, "no cached copy, serving offline fallback");
            offline_response(request.destination)
          }
        }
      }
    }
  }

  fn lookup<N: AsRef<str>>(&self, generations: &[N], identity: &RequestIdentity) -> Option<Response> {
    match self.store.match_in(generations, identity) {
      Ok(hit) => hit.map(CachedResponse::into_response),
      Err(e) => {
        warn!(request = %identity, error = %e, "cache lookup failed, treating as miss");
        None
      }
    }
  }

  /// Store a successful response in the dynamic generation.
  fn remember(&self, identity: &RequestIdentity, response: &Response) {
    if !response.is_success() {
      debug!(request = %identity, status = response.status, "not caching unsuccessful response");
      return;
    }

    if let Err(e) = self.store.put(&self.generations.dynamic, identity, response) {
      warn!(request = %identity, error = %e, "failed to update dynamic cache");
    }
  }
}
