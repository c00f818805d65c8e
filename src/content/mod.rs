//! Content cache: discipline directory, per-discipline bundles, question
//! lookup and realtime invalidation, with a static dataset as fallback.

mod cache;
mod errors;
mod fallback;
#[cfg(test)]
pub(crate) mod fixtures;
mod records;
mod resolver;
mod sync;
mod types;

pub use cache::{CacheSettings, ContentCache};
pub use fallback::StaticDataset;
pub use types::{
  Answer, AuditInfo, Bundle, Directory, Discipline, Question, QuestionDetails, QuestionWithAnswer,
  StructureType,
};
