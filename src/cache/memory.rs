//! In-process cache store, used when persistence is disabled.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};

use super::traits::{CacheStore, CachedResponse, RequestIdentity};
use crate::net::Response;

#[derive(Debug, Default)]
struct Generation {
  name: String,
  entries: HashMap<String, CachedResponse>,
}

/// Cache store that keeps everything in memory and forgets it on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
  // Vec keeps creation order for list_names
  generations: Mutex<Vec<Generation>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, name: &str) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !generations.iter().any(|g| g.name == name) {
      generations.push(Generation {
        name: name.to_string(),
        entries: HashMap::new(),
      });
    }

    Ok(())
  }

  fn get(&self, generation: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>> {
    if !identity.is_cacheable() {
      return Ok(None);
    }

    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .iter()
        .find(|g| g.name == generation)
        .and_then(|g| g.entries.get(&identity.cache_hash()))
        .cloned(),
    )
  }

  fn put(&self, generation: &str, identity: &RequestIdentity, response: &Response) -> Result<()> {
    identity.ensure_cacheable()?;
    self.open(generation)?;

    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let target = generations
      .iter_mut()
      .find(|g| g.name == generation)
      .ok_or_else(|| eyre!("Generation {} vanished while writing", generation))?;

    target.entries.insert(
      identity.cache_hash(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );

    Ok(())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let before = generations.len();
    generations.retain(|g| g.name != name);

    Ok(generations.len() < before)
  }

  fn list_names(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(generations.iter().map(|g| g.name.clone()).collect())
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .iter()
        .find(|g| g.name == name)
        .map_or(0, |g| g.entries.len()),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  #[test]
  fn test_put_creates_generation_lazily() {
    let store = MemoryStore::new();
    let url = Url::parse("https://shop.example/api/items").unwrap();
    let id = RequestIdentity::new(Method::GET, &url);

    store.put("dyn-v1", &id, &Response::new(200, "[]")).unwrap();

    assert_eq!(store.list_names().unwrap(), vec!["dyn-v1"]);
    assert_eq!(store.get("dyn-v1", &id).unwrap().unwrap().response.body, b"[]");
  }

  #[test]
  fn test_delete_unknown_generation_is_false() {
    let store = MemoryStore::new();
    store.open("a").unwrap();
    assert!(!store.delete("b").unwrap());
    assert!(store.delete("a").unwrap());
    assert!(store.list_names().unwrap().is_empty());
  }
}
