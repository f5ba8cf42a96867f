//! Request and response values exchanged between the runtime, the worker and the network.

use std::fmt;

use reqwest::{Method, StatusCode};
use url::Url;

/// What the requester intends to do with the response.
///
/// Only `Document` changes behavior: it selects the HTML offline page
/// instead of the plain 503 fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Destination {
  /// Top-level page navigation
  Document,
  Image,
  Script,
  Style,
  Font,
  Manifest,
  /// Script-initiated fetch/XHR with no specific destination
  #[default]
  Fetch,
}

impl fmt::Display for Destination {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Document => "document",
      Self::Image => "image",
      Self::Script => "script",
      Self::Style => "style",
      Self::Font => "font",
      Self::Manifest => "manifest",
      Self::Fetch => "fetch",
    };
    f.write_str(name)
  }
}

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      destination: Destination::default(),
    }
  }

  /// A plain GET with no particular destination.
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A top-level page load.
  #[cfg(test)]
  pub fn navigate(url: Url) -> Self {
    Self::get(url).with_destination(Destination::Document)
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }
}

/// Where a response handed back to the caller came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseSource {
  #[default]
  Network,
  /// Served from a cache generation
  Cache,
  /// Synthesized because neither cache nor network could answer
  Offline,
}

impl fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Network => f.write_str("network"),
      Self::Cache => f.write_str("cache"),
      Self::Offline => f.write_str("offline"),
    }
  }
}

/// A fully buffered response.
///
/// Buffering means the body can be cloned into the cache and still returned
/// to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  /// Header name/value pairs in received order. Values are raw bytes since
  /// servers may send obs-text that is not valid UTF-8.
  pub headers: Vec<(String, Vec<u8>)>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl Response {
  /// Create a network response with the canonical reason phrase for `status`.
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    let status_text = StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or_default()
      .to_string();

    Self {
      status,
      status_text,
      headers: Vec::new(),
      body: body.into(),
      source: ResponseSource::Network,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_source(mut self, source: ResponseSource) -> Self {
    self.source = source;
    self
  }

  /// 2xx status. Only these responses are ever written to the cache.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&[u8]> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_text_defaults_to_canonical_reason() {
    assert_eq!(Response::new(200, "").status_text, "OK");
    assert_eq!(Response::new(503, "").status_text, "Service Unavailable");
    assert_eq!(Response::new(799, "").status_text, "");
  }

  #[test]
  fn test_success_is_2xx_only() {
    assert!(Response::new(200, "").is_success());
    assert!(Response::new(204, "").is_success());
    assert!(!Response::new(304, "").is_success());
    assert!(!Response::new(404, "").is_success());
    assert!(!Response::new(500, "").is_success());
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response = Response::new(200, "x").with_header("Content-Type", "text/plain");
    assert_eq!(response.header("content-type"), Some(b"text/plain".as_slice()));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn test_navigate_is_document_get() {
    let request = Request::navigate(Url::parse("https://shop.example/").unwrap());
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.destination, Destination::Document);
  }
}
