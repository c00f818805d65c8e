//! Remote collection-store abstraction.
//!
//! The content cache talks to the store only through [`RecordStore`], so the
//! PocketBase client and the in-memory test store are interchangeable.

mod api_types;
#[cfg(test)]
pub mod memory;
mod pocketbase;
mod sse;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use pocketbase::PocketBaseClient;

/// Collections the content layer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  Disciplines,
  Questions,
  Answers,
}

impl Collection {
  pub const ALL: [Collection; 3] = [
    Collection::Disciplines,
    Collection::Questions,
    Collection::Answers,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Disciplines => "disciplines",
      Self::Questions => "questions",
      Self::Answers => "answers",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.as_str() == name)
  }
}

impl fmt::Display for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A filter expression in the store's query language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  /// `field = "value"`
  Eq { field: String, value: String },
  /// `a || b || ...`
  Or(Vec<Filter>),
}

impl Filter {
  pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
    Self::Eq {
      field: field.into(),
      value: value.into(),
    }
  }

  /// OR of `field = value` for every value.
  pub fn any_of<I, V>(field: &str, values: I) -> Self
  where
    I: IntoIterator<Item = V>,
    V: Into<String>,
  {
    Self::Or(values.into_iter().map(|v| Self::eq(field, v)).collect())
  }
}

impl fmt::Display for Filter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Eq { field, value } => {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        write!(f, "{} = \"{}\"", field, escaped)
      }
      Self::Or(parts) => {
        for (i, part) in parts.iter().enumerate() {
          if i > 0 {
            f.write_str(" || ")?;
          }
          match part {
            Self::Or(_) => write!(f, "({})", part)?,
            _ => write!(f, "{}", part)?,
          }
        }
        Ok(())
      }
    }
  }
}

/// Options for a full-list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
  pub sort: Option<String>,
  pub filter: Option<Filter>,
  /// Field projection; `None` fetches whole records.
  pub fields: Option<Vec<String>>,
}

impl ListQuery {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn sort(mut self, field: impl Into<String>) -> Self {
    self.sort = Some(field.into());
    self
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filter = Some(filter);
    self
  }

  pub fn fields(mut self, fields: &[&str]) -> Self {
    self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
    self
  }
}

/// Kind of change carried by a push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
  Create,
  Update,
  Delete,
}

/// A push notification from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
  pub collection: Collection,
  pub action: ChangeAction,
  pub record: serde_json::Value,
}

impl ChangeEvent {
  /// String field of the changed record, if present and non-empty.
  pub fn field(&self, name: &str) -> Option<&str> {
    self
      .record
      .get(name)
      .and_then(|v| v.as_str())
      .filter(|s| !s.is_empty())
  }
}

/// Live change-stream handle. Dropping it closes the underlying connection.
pub struct Subscription {
  events: mpsc::UnboundedReceiver<ChangeEvent>,
  reader: Option<JoinHandle<()>>,
}

impl Subscription {
  pub fn new(events: mpsc::UnboundedReceiver<ChangeEvent>, reader: Option<JoinHandle<()>>) -> Self {
    Self { events, reader }
  }

  /// Next event; `None` once the stream has ended.
  pub async fn recv(&mut self) -> Option<ChangeEvent> {
    self.events.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(reader) = self.reader.take() {
      reader.abort();
    }
  }
}

/// Errors from the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Network request failed.
  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  /// Record or route not found.
  #[error("Not found: {0}")]
  NotFound(String),

  /// Non-success response from the store.
  #[error("Store returned {status}: {message}")]
  Status { status: u16, message: String },

  /// Response body did not match the expected shape.
  #[error("Failed to decode record: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("Invalid store URL: {0}")]
  InvalidUrl(#[from] url::ParseError),

  /// Remote call did not settle in time.
  #[error("Request timed out after {0:?}")]
  Timeout(Duration),

  /// Realtime channel failure.
  #[error("Realtime error: {0}")]
  Realtime(String),
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound(_))
  }
}

/// Read-side contract of the remote collection store.
pub trait RecordStore: Send + Sync + 'static {
  /// Fetch every record matching `query`.
  fn list<T>(
    &self,
    collection: Collection,
    query: &ListQuery,
  ) -> impl Future<Output = Result<Vec<T>, StoreError>> + Send
  where
    T: DeserializeOwned + Send;

  /// First record matching `filter`, or [`StoreError::NotFound`].
  fn first<T>(
    &self,
    collection: Collection,
    filter: &Filter,
  ) -> impl Future<Output = Result<T, StoreError>> + Send
  where
    T: DeserializeOwned + Send;

  /// Open a change stream over `collections`.
  fn subscribe(
    &self,
    collections: &[Collection],
  ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;
}
