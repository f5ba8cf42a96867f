//! HTTP fetcher backed by reqwest.

use std::future::Future;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::Client;

use super::error::FetchError;
use super::types::{Request, Response};

/// Performs network fetches on behalf of the worker.
///
/// Implementations resolve to `Ok` for any response the server sent,
/// whatever its status, and to `Err` only when no response arrived.
pub trait Fetcher {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>>;
}

/// Fetcher that talks to the real network.
///
/// Every fetch, including reading the body, is bounded by `timeout`. A fetch
/// that runs out of time is reported as `FetchError::Timeout`.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
  timeout: Duration,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("swguard/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, timeout })
  }

  async fn send(&self, request: &Request) -> Result<Response, FetchError> {
    let url = &request.url;

    let resp = self
      .client
      .request(request.method.clone(), url.clone())
      .send()
      .await
      .map_err(|e| {
        if e.is_connect() {
          FetchError::Unreachable {
            url: url.clone(),
            reason: e.to_string(),
          }
        } else {
          FetchError::Request {
            url: url.clone(),
            source: e,
          }
        }
      })?;

    let status = resp.status();
    let headers = resp
      .headers()
      .iter()
      .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
      .collect();

    let body = resp.bytes().await.map_err(|e| FetchError::Body {
      url: url.clone(),
      source: e,
    })?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
      source: Default::default(),
    })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    match tokio::time::timeout(self.timeout, self.send(request)).await {
      Ok(result) => result,
      Err(_) => Err(FetchError::Timeout {
        url: request.url.clone(),
        timeout: self.timeout,
      }),
    }
  }
}
