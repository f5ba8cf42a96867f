//! Per-request strategy selection.

use std::collections::HashSet;
use std::fmt;

use reqwest::Method;
use url::Url;

use crate::config::Manifest;

/// Why a request is left to the runtime untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
  NonGet,
  ExcludedHost,
}

impl fmt::Display for PassReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NonGet => f.write_str("non-GET request"),
      Self::ExcludedHost => f.write_str("excluded host"),
    }
  }
}

/// How an intercepted request is fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Passthrough(PassReason),
  CacheFirst,
  NetworkFirst,
}

/// Classifies requests against the resource sets.
///
/// Classification depends only on method and URL.
#[derive(Debug, Clone)]
pub struct Router {
  origin: Url,
  /// Static and bundle URLs, fragment removed
  known_urls: HashSet<Url>,
  /// Paths of same-origin static entries
  static_paths: HashSet<String>,
  excluded_hosts: Vec<String>,
}

impl Router {
  pub fn new(manifest: &Manifest) -> Self {
    let origin = manifest.origin.clone();

    let known_urls = manifest
      .static_resources
      .iter()
      .chain(&manifest.bundle_resources)
      .cloned()
      .collect();

    let static_paths = manifest
      .static_resources
      .iter()
      .filter(|url| url.origin() == origin.origin())
      .map(|url| url.path().to_string())
      .collect();

    Self {
      origin,
      known_urls,
      static_paths,
      excluded_hosts: manifest.excluded_hosts.clone(),
    }
  }

  pub fn classify(&self, method: &Method, url: &Url) -> Route {
    if *method != Method::GET {
      return Route::Passthrough(PassReason::NonGet);
    }

    if self.is_excluded(url) {
      return Route::Passthrough(PassReason::ExcludedHost);
    }

    if self.is_static(url) {
      Route::CacheFirst
    } else {
      Route::NetworkFirst
    }
  }

  fn is_excluded(&self, url: &Url) -> bool {
    let Some(host) = url.host_str() else {
      return false;
    };
    let host = host.to_lowercase();
    self.excluded_hosts.iter().any(|h| host.contains(h.as_str()))
  }

  fn is_static(&self, url: &Url) -> bool {
    let mut bare = url.clone();
    bare.set_fragment(None);
    if self.known_urls.contains(&bare) {
      return true;
    }

    url.origin() == self.origin.origin() && self.static_paths.contains(url.path())
  }
}
