use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::ContentCache;
use super::records::AnswerRecord;
use super::types::{Answer, Bundle, QuestionWithAnswer};
use crate::store::{Collection, Filter, RecordStore};

impl<S: RecordStore> ContentCache<S> {
  /// Resolve one question of a discipline and its answer.
  ///
  /// `key` is matched against the question ordinal or record id. Absent
  /// data yields empty halves, never an error.
  pub async fn get_question(&self, slug: &str, key: impl Display) -> QuestionWithAnswer {
    let key = key.to_string();
    let Some(bundle) = self.load_bundle(slug, false).await else {
      debug!(slug, "No bundle available for question lookup");
      return QuestionWithAnswer::default();
    };

    let Some(question) = bundle.find_question(&key).cloned() else {
      debug!(slug, key = %key, "Question not in bundle");
      return QuestionWithAnswer::default();
    };

    let mut answer = bundle.answer_for(&question).cloned();
    if answer.is_none() && !bundle.is_static {
      if let Some(question_id) = question.record_id.as_deref() {
        answer = self.recover_answer(slug, &bundle, question_id).await;
      }
    }

    QuestionWithAnswer {
      question: Some(question),
      answer,
    }
  }

  /// Point lookup for an answer the bundle does not carry yet, merged into
  /// the cached bundle when found.
  async fn recover_answer(
    &self,
    slug: &str,
    bundle: &Arc<Bundle>,
    question_id: &str,
  ) -> Option<Answer> {
    let filter = Filter::eq("question", question_id);
    let lookup = self
      .store()
      .first::<AnswerRecord>(Collection::Answers, &filter);

    let record = match self.remote(lookup).await {
      Ok(record) => record,
      Err(e) if e.is_not_found() => return None,
      Err(e) => {
        warn!(slug, question = %question_id, "Answer recovery failed: {}", e);
        return None;
      }
    };

    let mut answer = Answer::from(record);
    let Some(question) = bundle
      .questions
      .iter()
      .find(|q| q.record_id.as_deref() == Some(question_id))
    else {
      return Some(answer);
    };
    answer.number = question.number;

    // Merge only if the bundle we read from is still the cached one.
    let mut state = self.state();
    if let Some(cached) = state.bundles.get_mut(slug) {
      if Arc::ptr_eq(&cached.bundle, bundle) {
        let mut updated = (**bundle).clone();
        updated.answers.insert(question.number, answer.clone());
        cached.bundle = Arc::new(updated);
        info!(slug, number = question.number, "Recovered missing answer");
      }
    }

    Some(answer)
  }
}
