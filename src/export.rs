//! Dump the live store into a static dataset file.

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use crate::content::{ContentCache, StaticDataset};
use crate::store::RecordStore;

/// Force-refresh every discipline and write the result to `out`.
///
/// Disciplines that could only be served from static data are skipped.
/// Returns the number of disciplines written.
pub async fn export<S: RecordStore>(cache: &ContentCache<S>, out: &Path) -> Result<usize> {
  let directory = cache.load_directory(true).await;
  if directory.is_static() {
    return Err(eyre!("Store is unreachable, nothing to export"));
  }

  let mut dataset = StaticDataset::empty();
  for discipline in directory.iter() {
    match cache.load_bundle(&discipline.slug, true).await {
      Some(bundle) if !bundle.is_static => {
        info!(
          slug = %discipline.slug,
          questions = bundle.questions.len(),
          answers = bundle.answers.len(),
          "Exported discipline"
        );
        dataset.insert_bundle(&bundle);
      }
      Some(_) => warn!(slug = %discipline.slug, "Skipping discipline served from static data"),
      None => warn!(slug = %discipline.slug, "Skipping discipline with no data"),
    }
  }

  dataset.save(out)?;
  info!(path = %out.display(), count = dataset.len(), "Static dataset written");
  Ok(dataset.len())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::content::fixtures::{discipline_id, question_id, seed_discipline, settings};
  use crate::store::memory::MemoryStore;
  use crate::store::Collection;
  use serde_json::json;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_export_writes_loadable_dataset() {
    let store = MemoryStore::new();
    seed_discipline(&store, "criminal-law", 1, 4, 3);
    seed_discipline(&store, "finance-law", 2, 2, 2);
    let cache = ContentCache::new(store, StaticDataset::empty(), settings());
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nested").join("static.json");

    let count = export(&cache, &path).await.expect("export");
    assert_eq!(count, 2);

    let dataset = StaticDataset::load(&path).expect("load");
    let bundle = dataset.bundle("criminal-law").expect("bundle");
    assert!(bundle.is_static);
    assert_eq!(bundle.questions.len(), 4);
    assert_eq!(bundle.answers.len(), 3);
    assert_eq!(bundle.answers[&2].title, "Ответ 2");
    assert_eq!(bundle.discipline.title, "Дисциплина criminal-law");
  }

  #[tokio::test]
  async fn test_export_refuses_when_store_is_down() {
    let store = MemoryStore::new();
    store.fail_when(|_| true);
    let cache = ContentCache::new(store, StaticDataset::empty(), settings());
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("static.json");

    assert!(export(&cache, &path).await.is_err());
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn test_export_skips_failing_discipline() {
    let store = MemoryStore::new();
    seed_discipline(&store, "criminal-law", 1, 2, 2);
    seed_discipline(&store, "finance-law", 2, 2, 2);
    let cache = ContentCache::new(store, StaticDataset::empty(), settings());
    cache.store().fail_when(|call| {
      call.filter.as_ref().map(|f| f.to_string()) == Some(r#"discipline = "d-finance-law""#.to_string())
    });
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("static.json");

    let count = export(&cache, &path).await.expect("export");

    assert_eq!(count, 1);
    let dataset = StaticDataset::load(&path).expect("load");
    assert!(dataset.bundle("criminal-law").is_some());
    assert!(dataset.bundle("finance-law").is_none());
  }

  #[tokio::test]
  async fn test_export_keys_answers_by_question_number() {
    let store = MemoryStore::new();
    seed_discipline(&store, "criminal-law", 1, 2, 0);
    store.insert(
      Collection::Answers,
      json!({ "id": "a1", "question": question_id("criminal-law", 1), "decription": "Первый" }),
    );
    store.insert(
      Collection::Answers,
      json!({ "id": "a2", "question": question_id("criminal-law", 2), "number": 7, "decription": "Второй" }),
    );
    let cache = ContentCache::new(store, StaticDataset::empty(), settings());
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("static.json");

    export(&cache, &path).await.expect("export");

    let bundle = StaticDataset::load(&path)
      .expect("load")
      .bundle("criminal-law")
      .expect("bundle");
    assert!(bundle.answers.keys().copied().eq([1, 2]));
    let second = bundle.find_question("2").expect("question");
    assert_eq!(bundle.answer_for(second).map(|a| a.title.as_str()), Some("Второй"));
  }

  #[tokio::test]
  async fn test_export_keeps_generation_hints() {
    let store = MemoryStore::new();
    seed_discipline(&store, "criminal-law", 1, 1, 1);
    store.upsert(
      Collection::Questions,
      json!({
        "id": question_id("criminal-law", 1),
        "discipline": discipline_id("criminal-law"),
        "number": 1,
        "title": "Состав преступления",
        "ai_instructions": "Ссылаться на статьи УК",
        "ai_answer_format": "json",
        "language": "en",
      }),
    );
    let cache = ContentCache::new(store, StaticDataset::empty(), settings());
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("static.json");

    export(&cache, &path).await.expect("export");

    let bundle = StaticDataset::load(&path)
      .expect("load")
      .bundle("criminal-law")
      .expect("bundle");
    let details = &bundle.questions[0].details;
    assert_eq!(details.ai_instructions, "Ссылаться на статьи УК");
    assert_eq!(details.ai_answer_format, "json");
    assert_eq!(details.language, "en");
  }
}
