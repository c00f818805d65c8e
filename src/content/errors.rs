//! Side-channel registry of the last failure per resource.
//!
//! Loaders never return errors to callers; what went wrong is recorded here
//! for diagnostics instead.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Registry key for the discipline directory.
pub const DIRECTORY_KEY: &str = "directory";
/// Registry key for the realtime subscription.
pub const REALTIME_KEY: &str = "realtime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
  pub message: String,
  pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ErrorRegistry {
  entries: Mutex<BTreeMap<String, ResourceError>>,
}

impl ErrorRegistry {
  pub fn record(&self, key: &str, error: &dyn fmt::Display) {
    self.lock().insert(
      key.to_string(),
      ResourceError {
        message: error.to_string(),
        at: Utc::now(),
      },
    );
  }

  /// Forget the failure for `key` after a successful load.
  pub fn clear(&self, key: &str) {
    self.lock().remove(key);
  }

  pub fn get(&self, key: &str) -> Option<ResourceError> {
    self.lock().get(key).cloned()
  }

  pub fn snapshot(&self) -> Vec<(String, ResourceError)> {
    self
      .lock()
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ResourceError>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
