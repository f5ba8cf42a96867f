//! Network boundary: request/response types and the fetcher used by the worker.

mod client;
mod error;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use error::FetchError;
pub use types::{Destination, Request, Response, ResponseSource};
