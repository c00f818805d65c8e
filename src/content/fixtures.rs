//! Seed data for the content tests.

use std::time::Duration;

use serde_json::json;

use super::cache::CacheSettings;
use crate::store::memory::MemoryStore;
use crate::store::Collection;

pub(crate) fn settings() -> CacheSettings {
  CacheSettings {
    bundle_ttl: Duration::from_secs(300),
    request_timeout: Duration::from_secs(15),
    answer_chunk_size: 30,
  }
}

pub(crate) fn discipline_id(slug: &str) -> String {
  format!("d-{}", slug)
}

pub(crate) fn question_id(slug: &str, number: u32) -> String {
  format!("{}-q{}", slug, number)
}

/// Insert a discipline with `questions` questions numbered from 1 and
/// answers for the first `answers` of them.
pub(crate) fn seed_discipline(
  store: &MemoryStore,
  slug: &str,
  order: i64,
  questions: u32,
  answers: u32,
) {
  store.insert(
    Collection::Disciplines,
    json!({
      "id": discipline_id(slug),
      "slug": slug,
      "title": format!("Дисциплина {}", slug),
      "description": "",
      "category": "law",
      "order": order,
    }),
  );

  for number in 1..=questions {
    store.insert(
      Collection::Questions,
      json!({
        "id": question_id(slug, number),
        "discipline": discipline_id(slug),
        "number": number,
        "title": format!("Вопрос {}", number),
        "structure_type": "concept_analysis",
        "difficulty": "medium",
      }),
    );
  }

  for number in 1..=answers.min(questions) {
    store.insert(
      Collection::Answers,
      answer_record(slug, number, &format!("Ответ {}", number)),
    );
  }
}

pub(crate) fn answer_record(slug: &str, number: u32, title: &str) -> serde_json::Value {
  json!({
    "id": format!("{}-a{}", slug, number),
    "question": question_id(slug, number),
    "number": number,
    "structure_type": "concept_analysis",
    "decription": title,
    "content": { "definition": title },
  })
}
