mod config;
mod gemini;
mod logger;
mod models;
mod router;
mod summary;
mod ui;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use config::{load_or_init, AppConfig};
use gemini::{GeminiClient, GeminiError};
use models::Outcome;
use router::{run_router, RouterState};
use workflow::{Attachment, WorkflowInput};

#[derive(Parser)]
#[command(name = "curriculens")]
#[command(about = "CurricuLens Academic Hub: math, science, English and test help backed by Gemini")]
#[command(version)]
struct Cli {
  /// Settings file, created with defaults when missing
  #[arg(long, global = true, default_value = "curriculens.json")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the web interface (default)
  Serve {
    /// Address to bind, e.g. 127.0.0.1:7860
    #[arg(short, long)]
    bind: Option<String>,
  },
  /// Solve a math problem from an image
  Math { image: PathBuf },
  /// Answer a science question, optionally with an image
  Science {
    question: String,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  /// Check grammar and style of an essay
  English {
    /// Essay text; use --file to read it from disk instead
    essay: Option<String>,
    #[arg(long, conflicts_with = "essay")]
    file: Option<PathBuf>,
  },
  /// Grade an answer sheet PDF
  Evaluate { pdf: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let config = load_or_init(&cli.config)?.with_env();
  logger::init(&config.log_path).context("failed to initialise logging")?;

  let gemini = Arc::new(GeminiClient::new(config.api_url.clone(), config.api_key.clone()));

  match cli.command.unwrap_or(Command::Serve { bind: None }) {
    Command::Serve { bind } => serve(config, gemini, bind).await,
    command => {
      print_outcome(one_shot(&gemini, command).await?);
      Ok(())
    }
  }
}

/// Runs a single workflow on local files. The credential is checked before any file is read.
async fn one_shot(gemini: &GeminiClient, command: Command) -> anyhow::Result<Outcome> {
  if !gemini.has_api_key() {
    return Ok(Outcome::from(GeminiError::MissingApiKey));
  }

  let input = match command {
    Command::Serve { .. } => anyhow::bail!("serve is not a one-shot command"),
    Command::Math { image } => WorkflowInput::Math {
      image: Some(Attachment::from_path(&image).await?),
    },
    Command::Science { question, image } => {
      let image = match image {
        Some(path) => Some(Attachment::from_path(&path).await?),
        None => None,
      };
      WorkflowInput::Science { question, image }
    }
    Command::English { essay, file } => {
      let essay = match file {
        Some(path) => tokio::fs::read_to_string(&path)
          .await
          .with_context(|| format!("failed to read {}", path.display()))?,
        None => essay.unwrap_or_default(),
      };
      WorkflowInput::English { essay }
    }
    Command::Evaluate { pdf } => WorkflowInput::TestEvaluation {
      pdf: Some(Attachment::from_path(&pdf).await?),
    },
  };
  Ok(workflow::run(gemini, input).await)
}

async fn serve(config: AppConfig, gemini: Arc<GeminiClient>, bind: Option<String>) -> anyhow::Result<()> {
  let page = ui::load_page(&config.stylesheet_path)?;
  let bind = bind.unwrap_or(config.bind_addr);
  let listener = tokio::net::TcpListener::bind(&bind)
    .await
    .with_context(|| format!("failed to bind {bind}"))?;

  info!(
    endpoint = %gemini.endpoint(),
    api_key_configured = gemini.has_api_key(),
    "CurricuLens starting up"
  );

  let state = RouterState::new(gemini, page, config.max_concurrent_requests);
  run_router(listener, state, config.max_upload_bytes).await
}

fn print_outcome(outcome: Outcome) {
  println!("{}", outcome.detailed);
  println!();
  println!("{}", outcome.summary);
}
