use std::sync::Arc;

use anyhow::Context;
use cascade_orchestrator::api::{self, AppState};
use cascade_orchestrator::repository::{ExecutionStore, InMemoryStore, PgExecutionStore};
use cascade_orchestrator::{Config, Orchestrator, db};
use cascade_runner::backend::check_runtime_available;
use cascade_runner::{PodmanBackend, WorkerPool};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cascade_orchestrator=debug,cascade_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cascade Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("Configuration loaded:");
    tracing::info!("  Bind address: {}", config.bind_addr);
    tracing::info!("  Max parallel jobs: {}", config.runner.max_parallel_jobs);
    tracing::info!("  Dispatch queue capacity: {}", config.dispatch_queue_capacity);
    tracing::info!("  Container runtime: {}", config.runner.container_runtime);

    let store: Arc<dyn ExecutionStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            Arc::new(PgExecutionStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, execution state is kept in memory");
            Arc::new(InMemoryStore::new())
        }
    };

    if let Err(e) = check_runtime_available(&config.runner.container_runtime) {
        tracing::warn!("{:#}; jobs will fail until the runtime is available", e);
    }

    let (dispatcher, queue) = mpsc::channel(config.dispatch_queue_capacity);
    let orchestrator = Orchestrator::new(store, dispatcher);

    let backend = Arc::new(PodmanBackend::from_config(&config.runner));
    let workers = WorkerPool::new(config.runner.clone(), backend, Arc::new(orchestrator.clone()));
    let consumer = workers.clone();
    tokio::spawn(async move { consumer.run(queue).await });

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        orchestrator,
        workers,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
