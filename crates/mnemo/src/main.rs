// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! mnemo - a long-term memory subsystem for conversational agents.
//!
//! This binary is the maintenance surface over a mnemo data directory:
//! listing and searching memories, stats, a terminal dashboard, and a
//! legacy plain-text import.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod dashboard;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mnemo_agent::{coordinator::resolve_data_dir, Coordinator, LogSink};
use mnemo_config::MnemoConfig;
use mnemo_core::{Embedder, LanguageModel, MnemoError};
use mnemo_llm::HttpLanguageModel;
use mnemo_memory::{ModelManager, OnnxEmbedder};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// mnemo - long-term memory for conversational agents.
#[derive(Parser, Debug)]
#[command(name = "mnemo", version, about, long_about = None)]
struct Cli {
    /// Path to a mnemo.toml config file (default: XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit structured JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored memories.
    List {
        /// Owner to list for (default: configured user).
        #[arg(long)]
        user_id: Option<String>,
        /// Scope: session, long-term, or all.
        #[arg(long)]
        scope: Option<String>,
        /// Maximum entries.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Semantic search over the hot tier (and archive with --deep).
    Search {
        /// The query text.
        query: String,
        /// Maximum results.
        #[arg(long)]
        limit: Option<usize>,
        /// Include the cold archive.
        #[arg(long)]
        deep: bool,
    },
    /// Show aggregated memory statistics.
    Stats,
    /// Render a terminal status dashboard.
    Dashboard,
    /// Import memories from a plain-text file, one per line.
    ImportLegacy {
        /// Path to the legacy file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mnemo: configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    if let Err(e) = run(cli, config).await {
        eprintln!("mnemo: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<MnemoConfig, mnemo_config::ConfigFileError> {
    match &cli.config {
        Some(path) => mnemo_config::load_config_from_path(path),
        None => mnemo_config::load_config(),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mnemo={level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, config: MnemoConfig) -> Result<(), MnemoError> {
    let coordinator = build_coordinator(config).await?;

    match cli.command {
        Commands::List {
            user_id,
            scope,
            limit,
        } => commands::run_list(&coordinator, user_id, scope, limit, cli.json).await,
        Commands::Search { query, limit, deep } => {
            commands::run_search(&coordinator, &query, limit, deep, cli.json).await
        }
        Commands::Stats => commands::run_stats(&coordinator, cli.json).await,
        Commands::Dashboard => dashboard::run_dashboard(&coordinator, cli.plain).await,
        Commands::ImportLegacy { file } => commands::run_import_legacy(&coordinator, &file).await,
    }
}

/// Builds a coordinator with the real embedder and configured provider.
///
/// A missing or undownloadable embedding model degrades to an embedder
/// that reports itself unavailable; recall and ingest then skip per
/// contract instead of aborting the CLI.
async fn build_coordinator(config: MnemoConfig) -> Result<Coordinator, MnemoError> {
    let data_dir = resolve_data_dir(&config)?;

    let embedder: Arc<dyn Embedder> = {
        let manager = ModelManager::new(data_dir.clone());
        match manager.ensure_model().await {
            Ok(model_path) => match OnnxEmbedder::new(&model_path) {
                Ok(embedder) => Arc::new(embedder),
                Err(e) => {
                    warn!(error = %e, "embedding model unusable, semantic search disabled");
                    Arc::new(UnavailableEmbedder)
                }
            },
            Err(e) => {
                warn!(error = %e, "embedding model download failed, semantic search disabled");
                Arc::new(UnavailableEmbedder)
            }
        }
    };

    let llm: Option<Arc<dyn LanguageModel>> = match &config.language_model {
        Some(provider_config) => Some(Arc::new(HttpLanguageModel::new(provider_config)?)),
        None => None,
    };

    Coordinator::new(config, embedder, llm, Arc::new(LogSink)).await
}

/// Stand-in embedder when no model could be loaded.
struct UnavailableEmbedder;

#[async_trait::async_trait]
impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MnemoError> {
        Err(MnemoError::EmbedderUnavailable(
            "no embedding model loaded".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        0
    }
}
