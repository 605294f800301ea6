use std::sync::Arc;

use mail_triage::analysis::AnalysisEngine;
use mail_triage::config::AppConfig;
use mail_triage::generator::{ResponseGenerator, TemplateModel};
use mail_triage::knowledge::{seed_defaults, Embedder, HashEmbedder, HttpEmbedder, KnowledgeStore};
use mail_triage::llm::{GenerativeModel, HttpModel, ModelConfig};
use mail_triage::pipeline::{Orchestrator, OrchestratorDeps};
use mail_triage::queue::WorkQueue;
use mail_triage::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Workers: {}", config.workers);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&config.db_path);
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path).await.unwrap_or_else(|e| {
            eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        }),
    );

    // ── Model and embedder ───────────────────────────────────────────────
    // With an API key the pipeline talks to a hosted model and embedding
    // service; without one it runs fully offline on the deterministic
    // template model and hash embedder.
    let (model, embedder): (Arc<dyn GenerativeModel>, Arc<dyn Embedder>) =
        match std::env::var("MAIL_TRIAGE_API_KEY") {
            Ok(api_key) => {
                let base_url = std::env::var("MAIL_TRIAGE_API_BASE")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
                let model_name = std::env::var("MAIL_TRIAGE_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string());
                let embed_model = std::env::var("MAIL_TRIAGE_EMBED_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string());
                eprintln!("   Model: {model_name}");

                let model = HttpModel::new(ModelConfig {
                    base_url: base_url.clone(),
                    api_key: secrecy::SecretString::from(api_key.clone()),
                    model: model_name,
                })?;
                let embedder = HttpEmbedder::new(
                    &base_url,
                    secrecy::SecretString::from(api_key),
                    &embed_model,
                    1536,
                );
                (Arc::new(model), Arc::new(embedder))
            }
            Err(_) => {
                eprintln!("   Model: template (offline — set MAIL_TRIAGE_API_KEY for a hosted model)");
                (Arc::new(TemplateModel::new()), Arc::new(HashEmbedder::new()))
            }
        };

    // ── Knowledge store ──────────────────────────────────────────────────
    let knowledge = Arc::new(KnowledgeStore::new(store.clone(), embedder));
    let seeded = seed_defaults(&knowledge).await?;
    if seeded > 0 {
        eprintln!("   Seeded {seeded} default knowledge articles");
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let engine = Arc::new(AnalysisEngine::new(
        config.analysis.clone(),
        store.clone(),
        None,
    ));
    let queue = Arc::new(WorkQueue::new(store.clone(), config.queue.clone()));
    let generator = Arc::new(ResponseGenerator::new(
        knowledge,
        model,
        config.generation.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorDeps {
        store,
        engine,
        queue,
        generator,
        queue_config: config.queue.clone(),
    }));

    let workers = orchestrator.spawn_workers(config.workers);
    eprintln!("   Pipeline running. Ctrl-C to stop.\n");

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down...");
    workers.shutdown().await;

    Ok(())
}
