//! Domain types served by the content cache.

use std::collections::BTreeMap;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

const DEFAULT_ANSWER_FORMAT: &str = "markdown";
const DEFAULT_LANGUAGE: &str = "ru";

fn text_or<'de, D>(deserializer: D, fallback: &str) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(
    Option::<String>::deserialize(deserializer)?
      .filter(|s| !s.is_empty())
      .unwrap_or_else(|| fallback.to_string()),
  )
}

fn answer_format<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  text_or(deserializer, DEFAULT_ANSWER_FORMAT)
}

fn language<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  text_or(deserializer, DEFAULT_LANGUAGE)
}

// ============================================================================
// Enumerations
// ============================================================================

/// Answer schema selector shared by a question and its answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
  SystemAnalysis,
  ConceptAnalysis,
  Procedural,
  ControlMechanisms,
  ActivityOrganization,
  FeatureAnalysis,
  ComparativeAnalysis,
  #[default]
  #[serde(other)]
  Unknown,
}

impl StructureType {
  pub fn title(&self) -> &'static str {
    match self {
      Self::SystemAnalysis => "Системный анализ",
      Self::ConceptAnalysis => "Понятийный анализ",
      Self::Procedural => "Процедурный формат",
      Self::ControlMechanisms => "Механизмы контроля",
      Self::ActivityOrganization => "Организация деятельности",
      Self::FeatureAnalysis => "Анализ особенностей",
      Self::ComparativeAnalysis => "Сравнительный анализ",
      Self::Unknown => "Без структуры",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Hard,
  #[default]
  #[serde(other)]
  Medium,
}

impl Difficulty {
  pub fn label(&self) -> &'static str {
    match self {
      Self::Easy => "Базовый",
      Self::Medium => "Средний",
      Self::Hard => "Повышенный",
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
  Often,
  Rare,
  #[default]
  #[serde(other)]
  Core,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
  Practice,
  Case,
  #[default]
  #[serde(other)]
  Theory,
}

// ============================================================================
// Disciplines
// ============================================================================

/// A subject area in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discipline {
  pub slug: String,
  /// Store record id; `None` when served from the static dataset
  pub record_id: Option<String>,
  pub title: String,
  pub description: Option<String>,
  pub category: Option<String>,
  pub order: i64,
  pub question_count: usize,
}

/// Slug-keyed snapshot of every discipline, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directory {
  entries: Vec<Discipline>,
  is_static: bool,
}

impl Directory {
  /// Sort by `order` and drop repeated slugs (first one wins).
  pub fn new(mut entries: Vec<Discipline>, is_static: bool) -> Self {
    entries.sort_by_key(|d| d.order);

    let mut seen = HashSet::new();
    entries.retain(|d| {
      let fresh = seen.insert(d.slug.clone());
      if !fresh {
        warn!(slug = %d.slug, "Duplicate discipline slug ignored");
      }
      fresh
    });

    Self { entries, is_static }
  }

  pub fn get(&self, slug: &str) -> Option<&Discipline> {
    self.entries.iter().find(|d| d.slug == slug)
  }

  pub fn find_by_record_id(&self, record_id: &str) -> Option<&Discipline> {
    self
      .entries
      .iter()
      .find(|d| d.record_id.as_deref() == Some(record_id))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Discipline> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// True when built from the static dataset instead of the store.
  pub fn is_static(&self) -> bool {
    self.is_static
  }
}

// ============================================================================
// Questions and answers
// ============================================================================

/// Question body shared by store records and the static dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionDetails {
  #[serde(deserialize_with = "null_as_default")]
  pub structure_type: StructureType,
  #[serde(deserialize_with = "null_as_default")]
  pub question_type: QuestionType,
  #[serde(deserialize_with = "null_as_default")]
  pub title: String,
  #[serde(deserialize_with = "null_as_default")]
  pub topic: String,
  #[serde(deserialize_with = "null_as_default")]
  pub prompt: String,
  #[serde(deserialize_with = "null_as_default")]
  pub key_aspects: Vec<String>,
  #[serde(deserialize_with = "null_as_default")]
  pub difficulty: Difficulty,
  #[serde(deserialize_with = "null_as_default")]
  pub importance: Importance,
  #[serde(deserialize_with = "null_as_default")]
  pub estimated_time_minutes: u32,
  #[serde(deserialize_with = "null_as_default")]
  pub tags: Vec<String>,
  #[serde(deserialize_with = "null_as_default")]
  pub sources: Vec<String>,
  #[serde(deserialize_with = "null_as_default")]
  pub learning_goals: Vec<String>,
  #[serde(deserialize_with = "null_as_default")]
  pub prerequisites: Vec<String>,
  /// Extra guidance for generated answers
  #[serde(deserialize_with = "null_as_default")]
  pub ai_instructions: String,
  #[serde(deserialize_with = "answer_format")]
  pub ai_answer_format: String,
  #[serde(deserialize_with = "language")]
  pub language: String,
}

impl Default for QuestionDetails {
  fn default() -> Self {
    Self {
      structure_type: StructureType::default(),
      question_type: QuestionType::default(),
      title: String::new(),
      topic: String::new(),
      prompt: String::new(),
      key_aspects: Vec::new(),
      difficulty: Difficulty::default(),
      importance: Importance::default(),
      estimated_time_minutes: 0,
      tags: Vec::new(),
      sources: Vec::new(),
      learning_goals: Vec::new(),
      prerequisites: Vec::new(),
      ai_instructions: String::new(),
      ai_answer_format: DEFAULT_ANSWER_FORMAT.to_string(),
      language: DEFAULT_LANGUAGE.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
  pub record_id: Option<String>,
  pub discipline_id: Option<String>,
  /// Ordinal, unique within the discipline
  pub number: u32,
  #[serde(flatten)]
  pub details: QuestionDetails,
}

impl Question {
  /// Match a route parameter against the ordinal or the record id.
  pub fn matches_key(&self, key: &str) -> bool {
    self.number.to_string() == key || self.record_id.as_deref() == Some(key)
  }
}

/// Who created and last modified a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditInfo {
  pub created_by: Option<String>,
  pub modified_by: Option<String>,
  pub modified_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
  pub record_id: Option<String>,
  /// Record id of the owning question (live data only)
  pub question_id: Option<String>,
  pub number: u32,
  pub structure_type: StructureType,
  pub title: String,
  pub content: serde_json::Value,
  pub audit: Option<AuditInfo>,
}

// ============================================================================
// Bundles
// ============================================================================

/// One discipline's questions and answers, cached as a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bundle {
  pub discipline: Discipline,
  pub questions: Vec<Question>,
  /// Answers keyed by question ordinal
  pub answers: BTreeMap<u32, Answer>,
  pub loaded_at: DateTime<Utc>,
  pub is_static: bool,
}

impl Bundle {
  pub fn find_question(&self, key: &str) -> Option<&Question> {
    let key = key.trim();
    self.questions.iter().find(|q| q.matches_key(key))
  }

  pub fn answer_for(&self, question: &Question) -> Option<&Answer> {
    self.answers.get(&question.number)
  }

  /// Whether any question or answer in the bundle points at `question_id`.
  pub fn references_question(&self, question_id: &str) -> bool {
    self
      .questions
      .iter()
      .any(|q| q.record_id.as_deref() == Some(question_id))
      || self
        .answers
        .values()
        .any(|a| a.question_id.as_deref() == Some(question_id))
  }
}

/// Result of resolving one question; both halves may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuestionWithAnswer {
  pub question: Option<Question>,
  pub answer: Option<Answer>,
}
