//! NorthStar application binary - composition root.
//!
//! 1. Load configuration from TOML and apply CLI/env overrides
//! 2. Open the conversation store (SQLite, or memory with --ephemeral)
//! 3. Index the reference documents for semantic search
//! 4. Wire the agent pipeline over the record store and generation backend
//! 5. Serve the HTTP API, or answer one query with `ask`

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use northstar_agent::{AgentOrchestrator, DisabledGeneration, HttpGeneration};
use northstar_api::state::AppState;
use northstar_core::config::NorthstarConfig;
use northstar_core::types::Query;
use northstar_core::{ConversationStore, Generation};
use northstar_storage::{Database, FileRecordStore, MemoryConversationStore, SqliteConversationStore};
use northstar_vector::{DocumentPipeline, HashEmbedding, VectorIndex, VectorSearch};

use crate::cli::{CliArgs, Command};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn conversation_store(
    ephemeral: bool,
    db_path: &std::path::Path,
) -> Result<Arc<dyn ConversationStore>, Box<dyn std::error::Error>> {
    if ephemeral {
        tracing::info!("Conversation history kept in memory (--ephemeral)");
        return Ok(Arc::new(MemoryConversationStore::new()));
    }
    let db = Database::new(db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite conversation store opened");
    Ok(Arc::new(SqliteConversationStore::new(Arc::new(db))))
}

fn generation_backend(config: &NorthstarConfig) -> Arc<dyn Generation> {
    match config.generation.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            tracing::info!(
                endpoint,
                primary = %config.synthesis.primary_model_id,
                fallback = %config.synthesis.fallback_model_id,
                "Generation backend configured"
            );
            Arc::new(HttpGeneration::new(
                endpoint,
                config.synthesis.primary_model_id.clone(),
                config.synthesis.fallback_model_id.clone(),
                config.synthesis.timeout_ms,
            ))
        }
        _ => {
            tracing::warn!("No generation endpoint configured, answers use the default template");
            Arc::new(DisabledGeneration)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = NorthstarConfig::load_or_default(&config_file);
    config.general.port = args.resolve_port(config.general.port);
    config.general.data_dir = args.resolve_data_dir(&config.general.data_dir);
    config.general.log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing. RUST_LOG wins over the resolved level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting NorthStar v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");
    config.validate()?;

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let conversations =
        conversation_store(args.ephemeral, &data_dir.join(&config.storage.conversation_db))?;
    let records = Arc::new(FileRecordStore::new(data_dir.join(&config.storage.records_dir)));

    // Reference documents.
    let index = VectorIndex::new();
    let pipeline = DocumentPipeline::new(index.clone(), HashEmbedding::new());
    let documents_dir = data_dir.join(&config.storage.documents_dir);
    let report = pipeline.ingest_directory(&documents_dir).await?;
    tracing::info!(
        dir = %documents_dir.display(),
        documents = report.documents,
        chunks = report.chunks,
        skipped = report.skipped,
        "Reference documents indexed"
    );
    let search = Arc::new(VectorSearch::new(index.clone(), HashEmbedding::new()));

    let orchestrator = AgentOrchestrator::from_config(
        &config,
        records,
        search,
        generation_backend(&config),
        conversations,
    );

    match args.command() {
        Command::Ask { query, session } => {
            let query = match session {
                Some(id) => Query::in_session(query, id),
                None => Query::new(query),
            };
            let answer = orchestrator.handle(query).await?;
            println!("{}", answer.text);
            eprintln!("session: {}  model: {}", answer.session_id, answer.used_model);
        }
        Command::Serve => {
            let state = AppState::new(orchestrator, index, config.general.port);
            northstar_api::start_server(state).await?;
        }
    }

    Ok(())
}
