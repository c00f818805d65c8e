//! Static dataset served when the store is unreachable.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};

use super::records::{StaticAnswer, StaticAnswers, StaticDiscipline, StaticQuestion};
use super::types::{Answer, Bundle, Directory, Discipline, Question};

/// Slug → discipline content, as shipped alongside the application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticDataset {
  disciplines: BTreeMap<String, StaticDiscipline>,
}

impl StaticDataset {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read static dataset {}: {}", path.display(), e))?;
    let disciplines = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse static dataset {}: {}", path.display(), e))?;
    Ok(Self { disciplines })
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create {}: {}", parent.display(), e))?;
    }
    let json = serde_json::to_string_pretty(&self.disciplines)
      .map_err(|e| eyre!("Failed to serialize static dataset: {}", e))?;
    std::fs::write(path, json)
      .map_err(|e| eyre!("Failed to write static dataset {}: {}", path.display(), e))
  }

  pub fn len(&self) -> usize {
    self.disciplines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.disciplines.is_empty()
  }

  /// Add or replace a discipline from a live bundle.
  pub fn insert_bundle(&mut self, bundle: &Bundle) {
    let discipline = &bundle.discipline;
    let mut answers: Vec<StaticAnswer> = bundle.answers.values().map(StaticAnswer::from).collect();
    answers.sort_by_key(|a| a.id);

    let mut questions: Vec<StaticQuestion> = bundle.questions.iter().map(StaticQuestion::from).collect();
    questions.sort_by_key(|q| q.id);

    self.disciplines.insert(
      discipline.slug.clone(),
      StaticDiscipline {
        title: discipline.title.clone(),
        description: discipline.description.clone(),
        category: discipline.category.clone(),
        order: Some(discipline.order),
        questions,
        answers: StaticAnswers { answers },
      },
    );
  }

  /// Directory built from the dataset: no record ids, counts from the question arrays.
  pub fn directory(&self) -> Directory {
    let entries = self
      .disciplines
      .iter()
      .enumerate()
      .map(|(index, (slug, data))| self.discipline(slug, data, index))
      .collect();
    Directory::new(entries, true)
  }

  /// Bundle for `slug`, with answers keyed by their own ordinal.
  pub fn bundle(&self, slug: &str) -> Option<Bundle> {
    let index = self.disciplines.keys().position(|k| k == slug)?;
    let data = self.disciplines.get(slug)?;

    let questions: Vec<Question> = data.questions.iter().cloned().map(Question::from).collect();
    let answers = data
      .answers
      .answers
      .iter()
      .cloned()
      .map(|a| (a.id, Answer::from(a)))
      .collect();

    Some(Bundle {
      discipline: self.discipline(slug, data, index),
      questions,
      answers,
      loaded_at: Utc::now(),
      is_static: true,
    })
  }

  fn discipline(&self, slug: &str, data: &StaticDiscipline, index: usize) -> Discipline {
    Discipline {
      slug: slug.to_string(),
      record_id: None,
      title: data.title.clone(),
      description: data.description.clone(),
      category: data.category.clone(),
      order: data.order.unwrap_or(index as i64),
      question_count: data.questions.len(),
    }
  }
}
