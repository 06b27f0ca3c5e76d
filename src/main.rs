use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use comm_intel::config::EngineConfig;
use comm_intel::error::ConfigError;
use comm_intel::extraction::LlmExtractor;
use comm_intel::llm::{LlmBackend, LlmConfig, create_provider};
use comm_intel::pipeline::{Engine, spawn_retry_sweep};
use comm_intel::store::{Database, LibSqlBackend};
use comm_intel::tasks::HttpTaskService;
use comm_intel::threads::ThreadPayload;

const USAGE: &str = "Usage: comm-intel [ingest <payload.json>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let ingest_path = match args.as_slice() {
        [] => None,
        [cmd, path] if cmd == "ingest" => Some(path.clone()),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let config = EngineConfig::from_env()?;
    let api_key = required_env("ANTHROPIC_API_KEY")?;
    let task_api_url = required_env("COMM_INTEL_TASK_API_URL")?;
    let model = std::env::var("COMM_INTEL_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    eprintln!("comm-intel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Task API: {}", task_api_url);

    // ── LLM + extraction capability ─────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })?;
    let capability = Arc::new(LlmExtractor::new(llm, config.max_message_chars));

    // ── Database ────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    // ── Engine ──────────────────────────────────────────────────────────
    let tasks = Arc::new(HttpTaskService::new(task_api_url));
    let engine = Arc::new(Engine::new(&config, db, capability, tasks));

    if let Some(path) = ingest_path {
        return ingest_file(&engine, &path).await;
    }

    let shutdown = CancellationToken::new();
    let sweep = spawn_retry_sweep(
        Arc::clone(&engine),
        config.retry_interval,
        config.retry_batch_size,
        shutdown.clone(),
    );
    eprintln!(
        "   Retry sweep: every {}s, {} threads per pass. Ctrl-C to stop.\n",
        config.retry_interval.as_secs(),
        config.retry_batch_size
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.cancel();
    sweep.await?;
    Ok(())
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Ingest one payload file, run extraction once, and print the thread's items.
async fn ingest_file(engine: &Engine, path: &str) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {path}"))?;
    let payload: ThreadPayload =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;

    let thread = engine.ingest(payload).await?;
    info!(thread_id = %thread.id, messages = thread.messages.len(), "Payload ingested");

    let outcome = engine.reprocess(&thread.id).await?;
    eprintln!(
        "Run {}: {} returned, {} dropped, {} created, {} already known",
        outcome.run.status.as_str(),
        outcome.run.candidates_returned,
        outcome.run.candidates_dropped,
        outcome.created.len(),
        outcome.skipped
    );
    if let Some(ref err) = outcome.run.error {
        eprintln!("   Error: {}", err);
    }

    let items = engine.thread_items(&thread.id).await?;
    for ranked in &items.open {
        println!(
            "[{:>5.1}] {} {} ({}): {}",
            ranked.score,
            ranked.item.id,
            ranked.item.kind(),
            ranked.item.confidence,
            ranked.item.payload.summary()
        );
    }
    eprintln!(
        "{} open, {} converted, {} dismissed",
        items.open.len(),
        items.converted.len(),
        items.dismissed.len()
    );
    Ok(())
}
