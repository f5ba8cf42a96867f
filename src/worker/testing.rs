//! Fakes for exercising the worker without a network or a disk.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::Worker;
use crate::cache::{CacheStore, CachedResponse, GenerationNames, MemoryStore, RequestIdentity};
use crate::config::Manifest;
use crate::net::{FetchError, Fetcher, Request, Response};

pub const STATIC_URLS: [&str; 4] = [
  "https://shop.example/",
  "https://shop.example/index.html",
  "https://shop.example/manifest.json",
  "https://img.example/logo.png",
];

pub const BUNDLE_URLS: [&str; 2] = ["https://unpkg.com/react.js", "https://cdn.example/tw.js"];

pub fn manifest() -> Manifest {
  let origin = Url::parse("https://shop.example/").unwrap();
  let static_resources = ["./", "./index.html", "./manifest.json", "https://img.example/logo.png"]
    .iter()
    .map(|e| origin.join(e).unwrap())
    .collect();

  Manifest {
    origin,
    static_resources,
    bundle_resources: BUNDLE_URLS.iter().map(|u| Url::parse(u).unwrap()).collect(),
    excluded_hosts: vec![
      "firestore.googleapis.com".to_string(),
      "firebase".to_string(),
      "gstatic.com".to_string(),
    ],
  }
}

pub fn worker_with(fetcher: ScriptedFetcher) -> Worker<RecordingStore, ScriptedFetcher> {
  Worker::with_manifest(
    RecordingStore::new(),
    fetcher,
    manifest(),
    GenerationNames::default(),
  )
}

/// Worker whose network serves every static and bundle URL.
pub fn online_worker() -> Worker<RecordingStore, ScriptedFetcher> {
  let fetcher = ScriptedFetcher::new();
  for url in STATIC_URLS.iter().chain(BUNDLE_URLS.iter()) {
    fetcher.respond(url, Response::new(200, *url));
  }
  worker_with(fetcher)
}

/// Fetcher that answers from a script and records every call.
///
/// URLs without a scripted response are unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
  scripts: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
  yields: usize,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Yield to the scheduler this many times before answering.
  pub fn with_yields(mut self, yields: usize) -> Self {
    self.yields = yields;
    self
  }

  pub fn respond(&self, url: &str, response: Response) {
    let key = Url::parse(url).unwrap().to_string();
    self.scripts.lock().unwrap().insert(key, response);
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls_to(&self, url: &str) -> usize {
    let key = Url::parse(url).unwrap().to_string();
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| **c == key)
      .count()
  }
}

impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    self.calls.lock().unwrap().push(request.url.to_string());

    for _ in 0..self.yields {
      tokio::task::yield_now().await;
    }

    let unreachable = || FetchError::Unreachable {
      url: request.url.clone(),
      reason: "scripted offline".to_string(),
    };

    if self.offline.load(Ordering::SeqCst) {
      return Err(unreachable());
    }

    self
      .scripts
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(unreachable)
  }
}

/// In-memory store that counts traffic and can be told to fail.
#[derive(Default)]
pub struct RecordingStore {
  inner: MemoryStore,
  reads: AtomicUsize,
  writes: AtomicUsize,
  unavailable: AtomicBool,
  failing_deletes: Mutex<HashSet<String>>,
}

impl RecordingStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reads(&self) -> usize {
    self.reads.load(Ordering::SeqCst)
  }

  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  /// Make every read and write fail.
  pub fn set_unavailable(&self, unavailable: bool) {
    self.unavailable.store(unavailable, Ordering::SeqCst);
  }

  pub fn fail_delete(&self, name: &str) {
    self.failing_deletes.lock().unwrap().insert(name.to_string());
  }

  fn check_available(&self) -> Result<()> {
    if self.unavailable.load(Ordering::SeqCst) {
      Err(eyre!("cache store unavailable"))
    } else {
      Ok(())
    }
  }
}

impl CacheStore for RecordingStore {
  fn open(&self, name: &str) -> Result<()> {
    self.check_available()?;
    self.inner.open(name)
  }

  fn get(&self, generation: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    self.check_available()?;
    self.inner.get(generation, identity)
  }

  fn put(&self, generation: &str, identity: &RequestIdentity, response: &Response) -> Result<()> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.check_available()?;
    self.inner.put(generation, identity, response)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    if self.failing_deletes.lock().unwrap().contains(name) {
      return Err(eyre!("delete of {} failed", name));
    }
    self.inner.delete(name)
  }

  fn list_names(&self) -> Result<Vec<String>> {
    self.inner.list_names()
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    self.inner.entry_count(name)
  }
}
