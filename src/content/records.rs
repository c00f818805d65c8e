//! Record shapes of the store collections and the static dataset.
//!
//! Kept apart from the domain types so field quirks of the store (empty
//! strings for unset relations, the `decription` column) stay here.

use serde::{Deserialize, Serialize};

use super::types::{
  null_as_default, Answer, AuditInfo, Discipline, Question, QuestionDetails, StructureType,
};

fn non_empty(value: String) -> Option<String> {
  if value.trim().is_empty() {
    None
  } else {
    Some(value)
  }
}

// ============================================================================
// Store records
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DisciplineRecord {
  pub id: String,
  pub slug: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub title: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub description: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub category: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub order: i64,
}

impl DisciplineRecord {
  pub fn into_discipline(self, question_count: usize) -> Discipline {
    Discipline {
      slug: self.slug,
      record_id: Some(self.id),
      title: self.title,
      description: non_empty(self.description),
      category: non_empty(self.category),
      order: self.order,
      question_count,
    }
  }
}

/// Projection used for the aggregate question count.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRef {
  #[serde(default, deserialize_with = "null_as_default")]
  pub discipline: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRecord {
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub discipline: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub number: u32,
  #[serde(flatten)]
  pub details: QuestionDetails,
}

impl From<QuestionRecord> for Question {
  fn from(record: QuestionRecord) -> Self {
    Question {
      record_id: Some(record.id),
      discipline_id: non_empty(record.discipline),
      number: record.number,
      details: record.details,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRecord {
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub question: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub number: u32,
  #[serde(default, deserialize_with = "null_as_default")]
  pub structure_type: StructureType,
  #[serde(default, deserialize_with = "null_as_default")]
  pub title: String,
  /// The store's column for the answer heading is misspelled.
  #[serde(default, deserialize_with = "null_as_default")]
  pub decription: String,
  #[serde(default)]
  pub content: serde_json::Value,
  #[serde(default, deserialize_with = "null_as_default")]
  pub created_by_name: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub created_by_email: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub modified_by_name: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub modified_by_email: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub modified_at: String,
}

impl From<AnswerRecord> for Answer {
  fn from(record: AnswerRecord) -> Self {
    let created_by = non_empty(record.created_by_name).or_else(|| non_empty(record.created_by_email));
    let modified_by =
      non_empty(record.modified_by_name).or_else(|| non_empty(record.modified_by_email));
    let modified_at = non_empty(record.modified_at);
    let audit = if created_by.is_some() || modified_by.is_some() || modified_at.is_some() {
      Some(AuditInfo {
        created_by,
        modified_by,
        modified_at,
      })
    } else {
      None
    };

    Answer {
      record_id: Some(record.id),
      question_id: non_empty(record.question),
      number: record.number,
      structure_type: record.structure_type,
      title: non_empty(record.decription).unwrap_or(record.title),
      content: record.content,
      audit,
    }
  }
}

// ============================================================================
// Static dataset
// ============================================================================

/// One discipline in the static dataset file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticDiscipline {
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub order: Option<i64>,
  #[serde(default)]
  pub questions: Vec<StaticQuestion>,
  #[serde(default)]
  pub answers: StaticAnswers,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticAnswers {
  #[serde(default)]
  pub answers: Vec<StaticAnswer>,
}

/// Static questions carry their ordinal in `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticQuestion {
  pub id: u32,
  #[serde(flatten)]
  pub details: QuestionDetails,
}

impl From<StaticQuestion> for Question {
  fn from(question: StaticQuestion) -> Self {
    Question {
      record_id: None,
      discipline_id: None,
      number: question.id,
      details: question.details,
    }
  }
}

impl From<&Question> for StaticQuestion {
  fn from(question: &Question) -> Self {
    StaticQuestion {
      id: question.number,
      details: question.details.clone(),
    }
  }
}

/// Static answers carry the ordinal of their question in `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAnswer {
  pub id: u32,
  #[serde(default)]
  pub structure_type: StructureType,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub content: serde_json::Value,
}

impl From<StaticAnswer> for Answer {
  fn from(answer: StaticAnswer) -> Self {
    Answer {
      record_id: None,
      question_id: None,
      number: answer.id,
      structure_type: answer.structure_type,
      title: answer.title,
      content: answer.content,
      audit: None,
    }
  }
}

impl From<&Answer> for StaticAnswer {
  fn from(answer: &Answer) -> Self {
    StaticAnswer {
      id: answer.number,
      structure_type: answer.structure_type,
      title: answer.title.clone(),
      content: answer.content.clone(),
    }
  }
}
