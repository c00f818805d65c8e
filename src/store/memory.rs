//! In-memory [`RecordStore`] used by the cache tests.
//!
//! Records are plain JSON values; filters and sorting are evaluated locally.
//! Every call is logged so tests can assert on the exact traffic, and
//! failures can be injected per call.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::{
  ChangeAction, ChangeEvent, Collection, Filter, ListQuery, RecordStore, StoreError, Subscription,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  List,
  First,
  Subscribe,
}

/// One recorded store call.
#[derive(Debug, Clone)]
pub struct Call {
  pub op: Op,
  pub collection: Option<Collection>,
  pub filter: Option<Filter>,
  pub fields: Option<Vec<String>>,
}

impl Call {
  /// Number of OR arms in the filter (1 for a plain equality).
  pub fn filter_width(&self) -> usize {
    match &self.filter {
      Some(Filter::Or(parts)) => parts.len(),
      Some(_) => 1,
      None => 0,
    }
  }
}

type FailRule = Arc<dyn Fn(&Call) -> bool + Send + Sync>;

#[derive(Default)]
pub struct MemoryStore {
  records: Mutex<HashMap<Collection, Vec<Value>>>,
  calls: Mutex<Vec<Call>>,
  fail_rules: Mutex<Vec<FailRule>>,
  latency: Mutex<Option<Duration>>,
  push: Mutex<Option<mpsc::UnboundedSender<ChangeEvent>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, collection: Collection, record: Value) {
    lock(&self.records)
      .entry(collection)
      .or_default()
      .push(record);
  }

  /// Replace a record with the same id, or insert it.
  pub fn upsert(&self, collection: Collection, record: Value) {
    let mut records = lock(&self.records);
    let rows = records.entry(collection).or_default();
    match rows.iter_mut().find(|r| r.get("id") == record.get("id")) {
      Some(existing) => *existing = record,
      None => rows.push(record),
    }
  }

  /// Make every call matching `rule` fail with a status error.
  pub fn fail_when(&self, rule: impl Fn(&Call) -> bool + Send + Sync + 'static) {
    lock(&self.fail_rules).push(Arc::new(rule));
  }

  pub fn clear_failures(&self) {
    lock(&self.fail_rules).clear();
  }

  /// Delay every call by `latency` (use with paused tokio time).
  pub fn set_latency(&self, latency: Duration) {
    *lock(&self.latency) = Some(latency);
  }

  pub fn calls(&self) -> Vec<Call> {
    lock(&self.calls).clone()
  }

  pub fn count(&self, op: Op, collection: Collection) -> usize {
    lock(&self.calls)
      .iter()
      .filter(|c| c.op == op && c.collection == Some(collection))
      .count()
  }

  pub fn reset_calls(&self) {
    lock(&self.calls).clear();
  }

  /// Deliver a change event to the open subscription. Returns false if none.
  pub fn push(&self, collection: Collection, action: ChangeAction, record: Value) -> bool {
    match lock(&self.push).as_ref() {
      Some(tx) => tx
        .send(ChangeEvent {
          collection,
          action,
          record,
        })
        .is_ok(),
      None => false,
    }
  }

  /// Close the open subscription from the server side.
  pub fn disconnect(&self) {
    lock(&self.push).take();
  }

  async fn enter(&self, call: Call) -> Result<(), StoreError> {
    let latency = *lock(&self.latency);
    let failing = lock(&self.fail_rules).iter().any(|rule| rule(&call));
    lock(&self.calls).push(call);

    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }
    if failing {
      return Err(StoreError::Status {
        status: 503,
        message: "injected failure".to_string(),
      });
    }
    Ok(())
  }

  fn query(&self, collection: Collection, query: &ListQuery) -> Vec<Value> {
    let records = lock(&self.records);
    let mut rows: Vec<Value> = records
      .get(&collection)
      .map(|rows| {
        rows
          .iter()
          .filter(|r| query.filter.as_ref().map_or(true, |f| matches(f, r)))
          .cloned()
          .collect()
      })
      .unwrap_or_default();

    if let Some(field) = &query.sort {
      rows.sort_by(|a, b| compare(a.get(field), b.get(field)));
    }
    if let Some(fields) = &query.fields {
      rows = rows.into_iter().map(|r| project(r, fields)).collect();
    }
    rows
  }
}

impl RecordStore for MemoryStore {
  async fn list<T>(&self, collection: Collection, query: &ListQuery) -> Result<Vec<T>, StoreError>
  where
    T: DeserializeOwned + Send,
  {
    self
      .enter(Call {
        op: Op::List,
        collection: Some(collection),
        filter: query.filter.clone(),
        fields: query.fields.clone(),
      })
      .await?;

    let rows = self.query(collection, query);
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
      out.push(serde_json::from_value(row)?);
    }
    Ok(out)
  }

  async fn first<T>(&self, collection: Collection, filter: &Filter) -> Result<T, StoreError>
  where
    T: DeserializeOwned + Send,
  {
    self
      .enter(Call {
        op: Op::First,
        collection: Some(collection),
        filter: Some(filter.clone()),
        fields: None,
      })
      .await?;

    let query = ListQuery::new().filter(filter.clone());
    match self.query(collection, &query).into_iter().next() {
      Some(row) => Ok(serde_json::from_value(row)?),
      None => Err(StoreError::NotFound(format!("{} matching {}", collection, filter))),
    }
  }

  async fn subscribe(&self, _collections: &[Collection]) -> Result<Subscription, StoreError> {
    self
      .enter(Call {
        op: Op::Subscribe,
        collection: None,
        filter: None,
        fields: None,
      })
      .await?;

    let (tx, rx) = mpsc::unbounded_channel();
    *lock(&self.push) = Some(tx);
    Ok(Subscription::new(rx, None))
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn scalar(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn matches(filter: &Filter, record: &Value) -> bool {
  match filter {
    Filter::Eq { field, value } => record.get(field).and_then(scalar).as_deref() == Some(value),
    Filter::Or(parts) => parts.iter().any(|p| matches(p, record)),
  }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (Some(Value::Number(x)), Some(Value::Number(y))) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(Ordering::Equal),
    (Some(x), Some(y)) => scalar(x).cmp(&scalar(y)),
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}

fn project(record: Value, fields: &[String]) -> Value {
  match record {
    Value::Object(map) => Value::Object(
      map
        .into_iter()
        .filter(|(k, _)| fields.iter().any(|f| f == k))
        .collect::<Map<String, Value>>(),
    ),
    other => other,
  }
}
