mod commands;
mod config;
mod content;
mod export;
mod store;
mod telemetry;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use content::{CacheSettings, ContentCache, StaticDataset};
use store::PocketBaseClient;

#[derive(Parser, Debug)]
#[command(name = "gosprep")]
#[command(about = "Browse and sync GosPrep exam content from a PocketBase store")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/gosprep/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Store URL, overriding the config file
  #[arg(long)]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all disciplines
  Disciplines {
    /// Bypass the cached directory
    #[arg(long)]
    refresh: bool,
  },
  /// List the questions of a discipline
  Questions {
    slug: String,
    /// Bypass the cached bundle
    #[arg(long)]
    refresh: bool,
  },
  /// Show one question and its answer
  Question {
    slug: String,
    /// Question number or record id
    number: String,
    /// Print as JSON
    #[arg(long)]
    json: bool,
  },
  /// Follow content changes, keeping the given disciplines loaded
  Watch { slugs: Vec<String> },
  /// Write the live content to a static dataset file
  Export {
    #[arg(short, long)]
    out: PathBuf,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = telemetry::init()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.url {
    config.pocketbase.url = url;
  }

  let client = PocketBaseClient::new(&config.pocketbase)
    .map_err(|e| eyre!("Failed to create store client: {}", e))?;

  if let Some(email) = &config.pocketbase.email {
    let password = config::Config::get_password()?;
    match client.authenticate(email, &password).await {
      Ok(user) => info!(user = %user.id, "Authenticated"),
      // Content is readable anonymously; carry on without a session.
      Err(e) => warn!("Authentication failed, continuing anonymously: {}", e),
    }
  }
  let session = client
    .current_user()
    .map(|user| user.email.or(user.name).unwrap_or(user.id));
  info!(
    url = %config.pocketbase.url,
    authenticated = client.is_authenticated(),
    session = ?session,
    "Store client ready"
  );

  let fallback = match &config.fallback {
    Some(path) => StaticDataset::load(path)?,
    None => StaticDataset::empty(),
  };
  if fallback.is_empty() {
    warn!("No static dataset configured, offline reads will come back empty");
  }

  let cache = ContentCache::new(client, fallback, CacheSettings::from(&config.cache));

  let result = match args.command {
    Command::Disciplines { refresh } => commands::disciplines(&cache, refresh).await,
    Command::Questions { slug, refresh } => commands::questions(&cache, &slug, refresh).await,
    Command::Question { slug, number, json } => {
      commands::question(&cache, &slug, &number, json).await
    }
    Command::Watch { slugs } => commands::watch(&cache, &slugs).await,
    Command::Export { out } => export::export(&cache, &out).await.map(|count| {
      println!("Exported {} disciplines to {}", count, out.display());
    }),
  };

  commands::print_errors(&cache);
  result
}
