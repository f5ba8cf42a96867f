use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Why a network fetch produced no response at all.
///
/// A response with an error status is not a `FetchError`; it is returned to the
/// caller as-is.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request to {url} timed out after {timeout:?}")]
  Timeout { url: Url, timeout: Duration },

  #[error("network unreachable for {url}: {reason}")]
  Unreachable { url: Url, reason: String },

  #[error("request to {url} failed: {source}")]
  Request {
    url: Url,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to read response body from {url}: {source}")]
  Body {
    url: Url,
    #[source]
    source: reqwest::Error,
  },
}

impl FetchError {
  /// URL of the request that failed.
  pub fn url(&self) -> &Url {
    match self {
      Self::Timeout { url, .. }
      | Self::Unreachable { url, .. }
      | Self::Request { url, .. }
      | Self::Body { url, .. } => url,
    }
  }
}
