//! Names of the current cache generations.

use std::fmt;

use serde::Deserialize;

/// Role a generation plays for the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  /// Critical same-origin assets, filled at install
  Static,
  /// Third-party bundles, filled best-effort at install
  Bundle,
  /// Anything the strategies store at runtime
  Dynamic,
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Static => f.write_str("static"),
      Self::Bundle => f.write_str("bundle"),
      Self::Dynamic => f.write_str("dynamic"),
    }
  }
}

/// The three current generation names. Each embeds a version tag; bumping
/// a tag makes the old generation stale on the next activation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerationNames {
  #[serde(rename = "static")]
  pub static_assets: String,
  pub bundle: String,
  pub dynamic: String,
}

impl GenerationNames {
  pub fn name(&self, role: Role) -> &str {
    match role {
      Role::Static => &self.static_assets,
      Role::Bundle => &self.bundle,
      Role::Dynamic => &self.dynamic,
    }
  }

  /// Current names in lookup order.
  pub fn current(&self) -> [&str; 3] {
    [&self.static_assets, &self.bundle, &self.dynamic]
  }

  pub fn role_of(&self, name: &str) -> Option<Role> {
    [Role::Static, Role::Bundle, Role::Dynamic]
      .into_iter()
      .find(|role| self.name(*role) == name)
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.role_of(name).is_some()
  }
}

impl Default for GenerationNames {
  fn default() -> Self {
    Self {
      static_assets: "swguard-static-v1".to_string(),
      bundle: "swguard-bundle-v1".to_string(),
      dynamic: "swguard-dynamic-v1".to_string(),
    }
  }
}
