//! Listings Server - Main entry point

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use listings_common::logging::{init_logging, LogConfig};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::{info, warn};

use listings_server::{
    config::Config,
    features, middleware,
    ingest::{
        framework::{
            ChunkWorker, IngestionCoordinator, KeySpace, LocalChunkQueue, Normalizer,
            ProgressStore, RecordSink, SinkWriter,
        },
        progress::{MemoryProgressStore, RedisProgressStore},
        sinks::{MongoRecordSink, PostgresProductSink},
        ProgressBackend,
    },
    AppError,
};

/// State for the top-level health check
#[derive(Clone)]
struct HealthState {
    db: sqlx::PgPool,
    progress: Arc<dyn ProgressStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("listings-server")
        .filter_directives("listings_server=debug,tower_http=debug,sqlx=info,mongodb=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Listings Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let progress: Arc<dyn ProgressStore> = match config.progress.backend {
        ProgressBackend::Redis => Arc::new(
            RedisProgressStore::connect(&config.progress.redis_url, &config.progress.key_prefix)
                .await
                .context("Failed to connect progress store")?,
        ),
        ProgressBackend::Memory => {
            warn!("Using in-memory progress store; job status is lost on restart");
            Arc::new(MemoryProgressStore::new(KeySpace::new(
                config.progress.key_prefix.clone(),
            )))
        },
    };
    progress.ping().await.context("Progress store is unreachable")?;
    info!(backend = ?config.progress.backend, "Progress store ready");

    let mongo_sink = MongoRecordSink::connect(
        &config.mongo.url,
        &config.mongo.database,
        &config.mongo.collection,
    )
    .await?;
    info!("Document sink ready");

    let sinks: Vec<Arc<dyn RecordSink>> = vec![
        Arc::new(PostgresProductSink::new(db_pool.clone())),
        Arc::new(mongo_sink),
    ];

    let denylist = config
        .ingest
        .denylist()
        .context("Invalid INGEST_DENYLIST_EXTRA")?;
    let batch_config = config.ingest.batch_config();
    let worker = ChunkWorker::new(
        Arc::new(Normalizer::new(denylist)),
        SinkWriter::new(sinks),
        progress.clone(),
        batch_config.clone(),
    );

    let (queue, queue_handle) = LocalChunkQueue::start(
        worker,
        config.ingest.queue_capacity,
        config.ingest.worker_concurrency,
    );
    let coordinator = Arc::new(IngestionCoordinator::new(
        progress.clone(),
        Arc::new(queue),
        batch_config,
    ));
    info!(
        chunk_size = config.ingest.chunk_size,
        workers = config.ingest.worker_concurrency,
        "Ingestion pipeline started"
    );

    let feature_state = features::FeatureState {
        db: db_pool.clone(),
        progress: progress.clone(),
        coordinator,
        upload_dir: config.ingest.upload_dir.clone(),
        max_upload_bytes: config.server.max_upload_bytes(),
    };
    let health_state = HealthState {
        db: db_pool,
        progress,
    };

    let app = create_router(feature_state, health_state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    // The router owned the last queue handles; wait for accepted chunks
    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(drain, queue_handle).await.is_err() {
        warn!("Chunk workers still running after {} seconds, exiting", drain.as_secs());
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(
    feature_state: features::FeatureState,
    health_state: HealthState,
    config: &Config,
) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(health_state)
        .nest("/api/v1", features::router(feature_state))
        .fallback(not_found)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Health check handler
async fn health_check(State(state): State<HealthState>) -> Result<Response, AppError> {
    if let Err(e) = sqlx::query("SELECT 1").execute(&state.db).await {
        tracing::error!("Database health check failed: {:?}", e);
        return Err(AppError::Unavailable("Database is unreachable".to_string()));
    }
    state.progress.ping().await?;

    Ok(Json(json!({
        "status": "healthy",
        "database": "connected",
        "progress_store": "connected"
    }))
    .into_response())
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give ongoing requests time to complete
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
