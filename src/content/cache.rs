//! Directory and bundle loaders.
//!
//! Loads go through shared futures registered in [`CacheState`]: the
//! directory has a single pending handle, bundles have one per slug. Every
//! caller that arrives while a load is running awaits the same future, so a
//! resource is never fetched twice concurrently. State is only touched under
//! the mutex and never across an `.await`; commits replace whole values.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::errors::{ErrorRegistry, ResourceError, DIRECTORY_KEY};
use super::fallback::StaticDataset;
use super::records::{AnswerRecord, DisciplineRecord, QuestionRecord, QuestionRef};
use super::sync::SubscriptionHandle;
use super::types::{Answer, Bundle, Directory, Discipline, Question};
use crate::config::CacheConfig;
use crate::store::{Collection, Filter, ListQuery, RecordStore, StoreError};

type SharedLoad<T> = Shared<BoxFuture<'static, T>>;

/// Tunables of the content cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
  pub bundle_ttl: Duration,
  pub request_timeout: Duration,
  pub answer_chunk_size: usize,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self::from(&CacheConfig::default())
  }
}

impl From<&CacheConfig> for CacheSettings {
  fn from(config: &CacheConfig) -> Self {
    Self {
      bundle_ttl: config.bundle_ttl(),
      request_timeout: config.request_timeout(),
      answer_chunk_size: config.answer_chunk_size.max(1),
    }
  }
}

#[derive(Debug, Error)]
pub(super) enum LoadError {
  #[error("Discipline not found: {0}")]
  DisciplineNotFound(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

pub(super) struct CachedBundle {
  pub bundle: Arc<Bundle>,
  pub fetched: Instant,
}

#[derive(Default)]
pub(super) struct CacheState {
  pub directory: Option<Arc<Directory>>,
  directory_pending: Option<SharedLoad<Arc<Directory>>>,
  pub bundles: HashMap<String, CachedBundle>,
  bundle_pending: HashMap<String, SharedLoad<Option<Arc<Bundle>>>>,
  pub subscription: Option<SubscriptionHandle>,
  pub subscription_generation: u64,
}

pub(super) struct Inner<S> {
  pub store: S,
  fallback: StaticDataset,
  settings: CacheSettings,
  state: Mutex<CacheState>,
  pub errors: ErrorRegistry,
}

/// In-memory cache of the discipline directory and per-discipline bundles.
///
/// Cloning is cheap and every clone shares the same cache.
pub struct ContentCache<S: RecordStore> {
  pub(super) inner: Arc<Inner<S>>,
}

impl<S: RecordStore> Clone for ContentCache<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: RecordStore> ContentCache<S> {
  pub fn new(store: S, fallback: StaticDataset, settings: CacheSettings) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        fallback,
        settings,
        state: Mutex::new(CacheState::default()),
        errors: ErrorRegistry::default(),
      }),
    }
  }

  pub(super) fn from_inner(inner: Arc<Inner<S>>) -> Self {
    Self { inner }
  }

  pub fn store(&self) -> &S {
    &self.inner.store
  }

  /// Last recorded failure per resource key.
  pub fn errors(&self) -> Vec<(String, ResourceError)> {
    self.inner.errors.snapshot()
  }

  pub fn error(&self, key: &str) -> Option<ResourceError> {
    self.inner.errors.get(key)
  }

  pub fn cached_directory(&self) -> Option<Arc<Directory>> {
    self.state().directory.clone()
  }

  /// Cached bundle for `slug`, fresh or not.
  pub fn cached_bundle(&self, slug: &str) -> Option<Arc<Bundle>> {
    self.state().bundles.get(slug).map(|c| Arc::clone(&c.bundle))
  }

  /// Evict one bundle. Returns whether anything was cached.
  pub fn invalidate_bundle(&self, slug: &str) -> bool {
    self.state().bundles.remove(slug).is_some()
  }

  pub(super) fn state(&self) -> MutexGuard<'_, CacheState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Run a store call under the request timeout.
  pub(super) async fn remote<T>(
    &self,
    call: impl Future<Output = Result<T, StoreError>>,
  ) -> Result<T, StoreError> {
    let limit = self.inner.settings.request_timeout;
    tokio::time::timeout(limit, call)
      .await
      .map_err(|_| StoreError::Timeout(limit))?
  }

  // ==========================================================================
  // Directory
  // ==========================================================================

  /// All disciplines, keyed by slug.
  ///
  /// Serves a non-empty cached directory unless `force_refresh`; joins a load
  /// already in flight; degrades to the static dataset on failure.
  pub async fn load_directory(&self, force_refresh: bool) -> Arc<Directory> {
    let pending = {
      let mut state = self.state();
      if !force_refresh {
        if let Some(directory) = state.directory.as_ref().filter(|d| !d.is_empty()) {
          return Arc::clone(directory);
        }
      }

      match &state.directory_pending {
        Some(pending) => {
          debug!("Joining in-flight directory load");
          pending.clone()
        }
        None => {
          let this = self.clone();
          let load = async move { this.refresh_directory().await }
            .boxed()
            .shared();
          state.directory_pending = Some(load.clone());
          load
        }
      }
    };

    pending.await
  }

  async fn refresh_directory(&self) -> Arc<Directory> {
    let directory = match self.fetch_directory().await {
      Ok(directory) => {
        info!(count = directory.len(), "Loaded discipline directory");
        self.inner.errors.clear(DIRECTORY_KEY);
        directory
      }
      Err(e) => {
        warn!("Directory fetch failed, serving static fallback: {}", e);
        self.inner.errors.record(DIRECTORY_KEY, &e);
        self.inner.fallback.directory()
      }
    };

    let directory = Arc::new(directory);
    let mut state = self.state();
    state.directory = Some(Arc::clone(&directory));
    state.directory_pending = None;
    directory
  }

  async fn fetch_directory(&self) -> Result<Directory, StoreError> {
    let store = &self.inner.store;

    let records: Vec<DisciplineRecord> = self
      .remote(store.list(Collection::Disciplines, &ListQuery::new().sort("order")))
      .await?;

    // One projection over all questions instead of a count query per discipline.
    let refs: Vec<QuestionRef> = self
      .remote(store.list(
        Collection::Questions,
        &ListQuery::new().fields(&["id", "discipline"]),
      ))
      .await?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for question in refs {
      *counts.entry(question.discipline).or_default() += 1;
    }

    let entries = records
      .into_iter()
      .map(|record| {
        let count = counts.get(&record.id).copied().unwrap_or(0);
        record.into_discipline(count)
      })
      .collect();

    Ok(Directory::new(entries, false))
  }

  // ==========================================================================
  // Bundles
  // ==========================================================================

  /// Questions and answers of one discipline.
  ///
  /// A cached bundle younger than the TTL is returned as is. On failure the
  /// previous bundle is kept if there is one, otherwise the static dataset
  /// is used; `None` only when neither exists.
  pub async fn load_bundle(&self, slug: &str, force_refresh: bool) -> Option<Arc<Bundle>> {
    let pending = {
      let mut state = self.state();
      if !force_refresh {
        if let Some(cached) = state.bundles.get(slug) {
          if cached.fetched.elapsed() < self.inner.settings.bundle_ttl {
            return Some(Arc::clone(&cached.bundle));
          }
        }
      }

      match state.bundle_pending.get(slug) {
        Some(pending) => {
          debug!(slug, "Joining in-flight bundle load");
          pending.clone()
        }
        None => {
          let this = self.clone();
          let key = slug.to_string();
          let load = async move { this.refresh_bundle(key).await }
            .boxed()
            .shared();
          state.bundle_pending.insert(slug.to_string(), load.clone());
          load
        }
      }
    };

    pending.await
  }

  async fn refresh_bundle(&self, slug: String) -> Option<Arc<Bundle>> {
    match self.fetch_bundle(&slug).await {
      Ok(bundle) => {
        info!(
          slug = %slug,
          questions = bundle.questions.len(),
          answers = bundle.answers.len(),
          "Loaded discipline bundle"
        );
        self.inner.errors.clear(&slug);

        let bundle = Arc::new(bundle);
        let mut state = self.state();
        state.bundle_pending.remove(&slug);
        state.bundles.insert(
          slug,
          CachedBundle {
            bundle: Arc::clone(&bundle),
            fetched: Instant::now(),
          },
        );
        Some(bundle)
      }
      Err(e) => {
        self.inner.errors.record(&slug, &e);

        let mut state = self.state();
        state.bundle_pending.remove(&slug);

        // Offline mode: keep serving what we had. Restamped so the store is
        // retried once per TTL rather than on every access.
        if let Some(previous) = state.bundles.get_mut(&slug) {
          warn!(slug = %slug, "Bundle refresh failed, serving previous copy: {}", e);
          previous.fetched = Instant::now();
          return Some(Arc::clone(&previous.bundle));
        }

        match self.inner.fallback.bundle(&slug) {
          Some(bundle) => {
            warn!(slug = %slug, "Bundle fetch failed, serving static fallback: {}", e);
            let bundle = Arc::new(bundle);
            state.bundles.insert(
              slug,
              CachedBundle {
                bundle: Arc::clone(&bundle),
                fetched: Instant::now(),
              },
            );
            Some(bundle)
          }
          None => {
            warn!(slug = %slug, "Bundle fetch failed and no static fallback exists: {}", e);
            None
          }
        }
      }
    }
  }

  async fn fetch_bundle(&self, slug: &str) -> Result<Bundle, LoadError> {
    let mut discipline = self.resolve_discipline(slug).await?;
    let discipline_id = discipline
      .record_id
      .clone()
      .ok_or_else(|| LoadError::DisciplineNotFound(slug.to_string()))?;

    let query = ListQuery::new()
      .filter(Filter::eq("discipline", discipline_id))
      .sort("number");
    let records: Vec<QuestionRecord> = self
      .remote(self.inner.store.list(Collection::Questions, &query))
      .await?;
    let questions: Vec<Question> = records.into_iter().map(Question::from).collect();

    let numbers: HashMap<&str, u32> = questions
      .iter()
      .filter_map(|q| Some((q.record_id.as_deref()?, q.number)))
      .collect();

    let mut answers = BTreeMap::new();
    for record in self.fetch_answers(&questions).await {
      let mut answer = Answer::from(record);
      let number = answer
        .question_id
        .as_deref()
        .and_then(|id| numbers.get(id).copied());
      if let Some(number) = number {
        // The record's own number is editable and may disagree.
        answer.number = number;
        answers.entry(number).or_insert(answer);
      }
    }

    discipline.question_count = questions.len();
    Ok(Bundle {
      discipline,
      questions,
      answers,
      loaded_at: Utc::now(),
      is_static: false,
    })
  }

  /// Directory entry with a record id, then a forced directory load, then a
  /// direct lookup by slug.
  async fn resolve_discipline(&self, slug: &str) -> Result<Discipline, LoadError> {
    let cached = self.cached_directory();
    if let Some(found) = cached
      .as_ref()
      .and_then(|d| d.get(slug))
      .filter(|d| d.record_id.is_some())
    {
      return Ok(found.clone());
    }

    let force = cached.as_ref().map_or(false, |d| d.is_static());
    let directory = self.load_directory(force).await;
    if let Some(found) = directory.get(slug).filter(|d| d.record_id.is_some()) {
      return Ok(found.clone());
    }

    debug!(slug, "Discipline missing from directory, trying direct lookup");
    let filter = Filter::eq("slug", slug);
    let lookup = self
      .inner
      .store
      .first::<DisciplineRecord>(Collection::Disciplines, &filter);
    match self.remote(lookup).await {
      Ok(record) => Ok(record.into_discipline(0)),
      Err(e) if e.is_not_found() => Err(LoadError::DisciplineNotFound(slug.to_string())),
      Err(e) => Err(e.into()),
    }
  }

  /// Answers for `questions`, one OR-filter query per chunk of ids.
  ///
  /// A failing chunk is retried id by id; a missing answer is not an error.
  async fn fetch_answers(&self, questions: &[Question]) -> Vec<AnswerRecord> {
    let ids: Vec<&str> = questions
      .iter()
      .filter_map(|q| q.record_id.as_deref())
      .collect();

    let mut answers = Vec::new();
    for chunk in ids.chunks(self.inner.settings.answer_chunk_size) {
      let query = ListQuery::new().filter(Filter::any_of("question", chunk.iter().copied()));
      let result = self
        .remote(self.inner.store.list::<AnswerRecord>(Collection::Answers, &query))
        .await;

      match result {
        Ok(found) => answers.extend(found),
        Err(e) => {
          warn!(
            size = chunk.len(),
            "Answer chunk failed, falling back to single lookups: {}", e
          );
          for id in chunk {
            let filter = Filter::eq("question", *id);
            let lookup = self
              .inner
              .store
              .first::<AnswerRecord>(Collection::Answers, &filter);
            match self.remote(lookup).await {
              Ok(answer) => answers.push(answer),
              Err(e) if e.is_not_found() => {}
              Err(e) => warn!(question = %id, "Answer lookup failed: {}", e),
            }
          }
        }
      }
    }
    answers
  }
}
