//! Realtime invalidation.
//!
//! A background task consumes the store's change stream and evicts whatever
//! the change touches; evicted data is reloaded lazily on the next access.
//! Nothing cached is ever patched in place.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{ContentCache, Inner};
use super::errors::REALTIME_KEY;
use crate::store::{ChangeEvent, Collection, RecordStore, Subscription};

/// Running event consumer. Dropping it stops the consumer and closes the
/// stream.
pub(super) struct SubscriptionHandle {
  task: JoinHandle<()>,
}

impl Drop for SubscriptionHandle {
  fn drop(&mut self) {
    self.task.abort();
  }
}

impl<S: RecordStore> ContentCache<S> {
  /// Start consuming change events for all three collections.
  ///
  /// A no-op when already subscribed. Returns whether a subscription is
  /// active afterwards.
  pub async fn subscribe(&self) -> bool {
    if self.is_subscribed() {
      return true;
    }

    let subscription = match self.remote(self.store().subscribe(&Collection::ALL)).await {
      Ok(subscription) => subscription,
      Err(e) => {
        warn!("Realtime subscription failed: {}", e);
        self.inner.errors.record(REALTIME_KEY, &e);
        return false;
      }
    };

    let mut state = self.state();
    if state.subscription.is_some() {
      // Another caller won the race; ours is dropped and closed.
      return true;
    }
    state.subscription_generation += 1;
    let generation = state.subscription_generation;
    let task = tokio::spawn(run_events(
      Arc::downgrade(&self.inner),
      subscription,
      generation,
    ));
    state.subscription = Some(SubscriptionHandle { task });
    self.inner.errors.clear(REALTIME_KEY);
    info!("Subscribed to content changes");
    true
  }

  /// Stop consuming change events. Returns whether a subscription was active.
  pub fn unsubscribe(&self) -> bool {
    let handle = self.state().subscription.take();
    if handle.is_some() {
      info!("Unsubscribed from content changes");
    }
    handle.is_some()
  }

  pub fn is_subscribed(&self) -> bool {
    self.state().subscription.is_some()
  }

  /// Evict every cached bundle that references `question_id`.
  pub fn evict_bundles_referencing(&self, question_id: &str) -> Vec<String> {
    let mut state = self.state();
    let slugs: Vec<String> = state
      .bundles
      .iter()
      .filter(|(_, cached)| cached.bundle.references_question(question_id))
      .map(|(slug, _)| slug.clone())
      .collect();
    for slug in &slugs {
      state.bundles.remove(slug);
    }
    slugs
  }

  async fn apply_event(&self, event: ChangeEvent) {
    debug!(collection = %event.collection, action = ?event.action, "Change event");

    match event.collection {
      Collection::Disciplines => {
        info!("Discipline changed, refreshing directory");
        self.load_directory(true).await;
      }
      Collection::Questions => {
        let Some(discipline_id) = event.field("discipline") else {
          debug!("Question event without discipline ignored");
          return;
        };
        let slug = self
          .cached_directory()
          .and_then(|d| d.find_by_record_id(discipline_id).map(|d| d.slug.clone()));
        let Some(slug) = slug else {
          debug!(discipline = %discipline_id, "Question event for unknown discipline dropped");
          return;
        };

        self.invalidate_bundle(&slug);
        info!(slug = %slug, "Question changed, bundle evicted");
        self.load_directory(true).await;
      }
      Collection::Answers => {
        let Some(question_id) = event.field("question") else {
          debug!("Answer event without question ignored");
          return;
        };
        let evicted = self.evict_bundles_referencing(question_id);
        if !evicted.is_empty() {
          info!(slugs = ?evicted, "Answer changed, bundles evicted");
        }
      }
    }
  }
}

/// Apply events until the stream ends or the cache is dropped.
async fn run_events<S: RecordStore>(
  inner: Weak<Inner<S>>,
  mut subscription: Subscription,
  generation: u64,
) {
  while let Some(event) = subscription.recv().await {
    let Some(inner) = inner.upgrade() else {
      return;
    };
    ContentCache::from_inner(inner).apply_event(event).await;
  }

  let Some(inner) = inner.upgrade() else {
    return;
  };
  warn!("Realtime stream ended");
  let cache = ContentCache::from_inner(inner);
  cache
    .inner
    .errors
    .record(REALTIME_KEY, &"change stream closed by server");

  let stale = {
    let mut state = cache.state();
    if state.subscription_generation == generation {
      state.subscription.take()
    } else {
      None
    }
  };
  // Aborts this task; nothing is awaited past this point.
  drop(stale);
}
