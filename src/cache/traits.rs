//! Core trait and types for the cache store.

use std::fmt;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

use crate::net::{Request, Response, ResponseSource};

/// Cache key for a request: its method and absolute URL.
///
/// The URL fragment never reaches the network, so it is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
  method: Method,
  url: Url,
}

impl RequestIdentity {
  pub fn new(method: Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self { method, url }
  }

  pub fn of(request: &Request) -> Self {
    Self::new(request.method.clone(), &request.url)
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Only GET requests may be stored or matched.
  pub fn is_cacheable(&self) -> bool {
    self.method == Method::GET
  }

  /// Fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Error out for identities that must never touch the cache.
  pub(crate) fn ensure_cacheable(&self) -> Result<()> {
    if self.is_cacheable() {
      Ok(())
    } else {
      Err(eyre!("Refusing to cache non-GET request {}", self))
    }
  }
}

impl fmt::Display for RequestIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A stored response together with when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
  /// The stored response, tagged as served from cache.
  pub fn into_response(self) -> Response {
    self.response.with_source(ResponseSource::Cache)
  }
}

/// Trait for cache store backends.
///
/// Generations are listed in creation order. Writing to a generation that
/// does not exist yet creates it. All writes are whole-entry overwrites.
pub trait CacheStore: Send + Sync {
  /// Create the generation if it does not exist.
  fn open(&self, name: &str) -> Result<()>;

  /// Look up an identity in one generation.
  fn get(&self, generation: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) the response for an identity.
  fn put(&self, generation: &str, identity: &RequestIdentity, response: &Response) -> Result<()>;

  /// Delete a generation and all of its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Names of all generations, oldest first.
  fn list_names(&self) -> Result<Vec<String>>;

  /// Number of entries in a generation (0 if it does not exist).
  fn entry_count(&self, name: &str) -> Result<usize>;

  /// First hit for `identity` across `generations`, searched in order.
  fn match_in<S: AsRef<str>>(
    &self,
    generations: &[S],
    identity: &RequestIdentity,
  ) -> Result<Option<CachedResponse>>
  where
    Self: Sized,
  {
    if !identity.is_cacheable() {
      return Ok(None);
    }

    for generation in generations {
      if let Some(hit) = self.get(generation.as_ref(), identity)? {
        return Ok(Some(hit));
      }
    }

    Ok(None)
  }
}
