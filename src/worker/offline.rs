//! Synthetic responses for when neither cache nor network can answer.

use crate::net::{Destination, Response, ResponseSource};

const OFFLINE_PAGE: &str = include_str!("../../assets/offline.html");

const UNAVAILABLE_BODY: &str = "Service unavailable";

/// Build the offline fallback for a request destination.
///
/// Page loads get a full HTML document with status 200 so the browser renders
/// it; every other destination gets a 503.
pub fn offline_response(destination: Destination) -> Response {
  match destination {
    Destination::Document => Response::new(200, OFFLINE_PAGE)
      .with_header("Content-Type", "text/html; charset=utf-8")
      .with_source(ResponseSource::Offline),
    _ => Response::new(503, UNAVAILABLE_BODY)
      .with_header("Content-Type", "text/plain; charset=utf-8")
      .with_source(ResponseSource::Offline),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_document_gets_html_page() {
    let response = offline_response(Destination::Document);
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some(b"text/html; charset=utf-8".as_slice()));
    assert!(response.body.starts_with(b"<!DOCTYPE html>"));
    assert!(String::from_utf8_lossy(&response.body).contains("location.reload()"));
    assert_eq!(response.source, ResponseSource::Offline);
  }

  #[test]
  fn test_other_destinations_get_503() {
    for destination in [
      Destination::Image,
      Destination::Script,
      Destination::Style,
      Destination::Font,
      Destination::Manifest,
      Destination::Fetch,
    ] {
      let response = offline_response(destination);
      assert_eq!(response.status, 503, "{}", destination);
      assert_eq!(response.status_text, "Service Unavailable");
      assert_eq!(response.body, UNAVAILABLE_BODY.as_bytes());
    }
  }
}
