//! CLI subcommands and their plain-text output.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::info;

use crate::content::{Bundle, ContentCache, Directory, QuestionWithAnswer};
use crate::store::RecordStore;

/// How often `watch` checks for evicted bundles.
const WATCH_INTERVAL: Duration = Duration::from_secs(2);

pub async fn disciplines<S: RecordStore>(cache: &ContentCache<S>, refresh: bool) -> Result<()> {
  let directory = cache.load_directory(refresh).await;
  print!("{}", render_directory(&directory));
  Ok(())
}

pub async fn questions<S: RecordStore>(
  cache: &ContentCache<S>,
  slug: &str,
  refresh: bool,
) -> Result<()> {
  let bundle = cache
    .load_bundle(slug, refresh)
    .await
    .ok_or_else(|| eyre!("Discipline not found: {}", slug))?;
  print!("{}", render_bundle(&bundle));
  if bundle.is_static {
    if let Some(error) = cache.error(slug) {
      eprintln!("Showing the offline copy of {}: {}", slug, error.message);
    }
  }
  Ok(())
}

pub async fn question<S: RecordStore>(
  cache: &ContentCache<S>,
  slug: &str,
  number: &str,
  json: bool,
) -> Result<()> {
  let result = cache.get_question(slug, number).await;
  if result.question.is_none() {
    return Err(eyre!("Question {} not found in {}", number, slug));
  }

  if json {
    let json = serde_json::to_string_pretty(&result)
      .map_err(|e| eyre!("Failed to serialize question: {}", e))?;
    println!("{}", json);
  } else {
    print!("{}", render_question(&result));
  }
  Ok(())
}

/// Keep the given bundles warm until Ctrl-C, reloading whatever a change
/// event evicts.
pub async fn watch<S: RecordStore>(cache: &ContentCache<S>, slugs: &[String]) -> Result<()> {
  let mut directory = cache.load_directory(false).await;
  for slug in slugs {
    if cache.load_bundle(slug, false).await.is_none() {
      return Err(eyre!("Discipline not found: {}", slug));
    }
  }

  if !cache.subscribe().await {
    return Err(eyre!("Could not subscribe to content changes"));
  }
  println!("Watching {} discipline(s), Ctrl-C to stop", slugs.len());

  let mut tick = tokio::time::interval(WATCH_INTERVAL);
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      _ = tick.tick() => {
        if !cache.is_subscribed() && cache.subscribe().await {
          println!("Resubscribed after the change stream closed");
        }

        if let Some(current) = cache.cached_directory() {
          if !Arc::ptr_eq(&current, &directory) {
            println!("Directory refreshed: {} disciplines", current.len());
            directory = current;
          }
        }

        for slug in slugs {
          if cache.cached_bundle(slug).is_some() {
            continue;
          }
          if let Some(bundle) = cache.load_bundle(slug, false).await {
            println!(
              "{}: reloaded {} questions, {} answers",
              slug,
              bundle.questions.len(),
              bundle.answers.len()
            );
          }
        }
      }
    }
  }

  cache.unsubscribe();
  info!("Watch stopped");
  Ok(())
}

/// Print the error registry to stderr, if anything failed.
pub fn print_errors<S: RecordStore>(cache: &ContentCache<S>) {
  let errors = cache.errors();
  if errors.is_empty() {
    return;
  }
  eprintln!("Some data could not be loaded from the store:");
  for (key, error) in errors {
    eprintln!(
      "  {} ({}): {}",
      key,
      error.at.format("%Y-%m-%d %H:%M:%S"),
      error.message
    );
  }
}

// ============================================================================
// Rendering
// ============================================================================

fn source_label(is_static: bool) -> &'static str {
  if is_static {
    " [offline copy]"
  } else {
    ""
  }
}

pub fn render_directory(directory: &Directory) -> String {
  let mut out = String::new();
  if directory.is_empty() {
    out.push_str("No disciplines available\n");
    return out;
  }

  let width = directory.iter().map(|d| d.slug.len()).max().unwrap_or(0);
  for discipline in directory.iter() {
    let _ = writeln!(
      out,
      "{:<width$}  {:>4}  {}",
      discipline.slug,
      discipline.question_count,
      discipline.title,
      width = width
    );
  }
  let _ = writeln!(
    out,
    "{} disciplines{}",
    directory.len(),
    source_label(directory.is_static())
  );
  out
}

pub fn render_bundle(bundle: &Bundle) -> String {
  let mut out = String::new();
  let _ = writeln!(
    out,
    "{}{}",
    bundle.discipline.title,
    source_label(bundle.is_static)
  );
  if let Some(description) = &bundle.discipline.description {
    let _ = writeln!(out, "{}", description);
  }
  out.push('\n');

  for question in &bundle.questions {
    let marker = if bundle.answer_for(question).is_some() {
      ' '
    } else {
      '*'
    };
    let _ = writeln!(
      out,
      "{:>4}{} {}",
      question.number, marker, question.details.title
    );
  }

  let missing = bundle.questions.len().saturating_sub(bundle.answers.len());
  let _ = writeln!(
    out,
    "\n{} questions, {} answered{}",
    bundle.questions.len(),
    bundle.answers.len(),
    if missing > 0 { " (* = no answer yet)" } else { "" }
  );
  out
}

pub fn render_question(result: &QuestionWithAnswer) -> String {
  let mut out = String::new();
  let Some(question) = &result.question else {
    return out;
  };
  let details = &question.details;

  let _ = writeln!(out, "#{} {}", question.number, details.title);
  let _ = writeln!(
    out,
    "{} | {} | ~{} min",
    details.structure_type.title(),
    details.difficulty.label(),
    details.estimated_time_minutes
  );
  if !details.topic.is_empty() {
    let _ = writeln!(out, "Topic: {}", details.topic);
  }
  if !details.prompt.is_empty() {
    let _ = writeln!(out, "\n{}", details.prompt);
  }
  if !details.key_aspects.is_empty() {
    out.push_str("\nKey aspects:\n");
    for aspect in &details.key_aspects {
      let _ = writeln!(out, "  - {}", aspect);
    }
  }

  out.push('\n');
  match &result.answer {
    Some(answer) => {
      let _ = writeln!(out, "Answer: {}", answer.title);
      let content = serde_json::to_string_pretty(&answer.content).unwrap_or_default();
      let _ = writeln!(out, "{}", content);
      if let Some(audit) = &answer.audit {
        let by = audit
          .modified_by
          .as_deref()
          .or(audit.created_by.as_deref())
          .unwrap_or("unknown");
        match &audit.modified_at {
          Some(at) => {
            let _ = writeln!(out, "Last edited by {} at {}", by, at);
          }
          None => {
            let _ = writeln!(out, "Edited by {}", by);
          }
        }
      }
    }
    None => out.push_str("No answer yet\n"),
  }
  out
}
