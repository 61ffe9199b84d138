//! ExerciseJudge - Application Entry Point
//!
//! This is the main entry point for the ExerciseJudge server.

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, extract::DefaultBodyLimit, middleware};
use bollard::Docker;
use redis::Client as RedisClient;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exercisejudge::{
    config::{Config, SandboxBackend, SandboxConfig},
    constants::{API_BASE_PATH, MAX_REQUEST_BODY_BYTES},
    db::{
        self,
        repositories::{EnrollmentRepository, ExerciseRepository, SubmissionRepository},
    },
    grading::{CodeExecutor, DockerSandbox, LanguageRegistry, ProcessSandbox, Sandbox},
    handlers,
    middleware::logging_middleware,
    services::GradingService,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.server.rust_log.clone().into());
    if config.server.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting ExerciseJudge server...");

    // Initialize database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database).await?;

    // Run database migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&db_pool).await?;

    // Initialize Redis connection
    tracing::info!("Connecting to Redis...");
    let redis_client = RedisClient::open(config.redis.url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;

    let sandbox = build_sandbox(&config.sandbox).await?;
    let executor = CodeExecutor::new(
        LanguageRegistry::new(&config.sandbox),
        sandbox,
        config.sandbox.memory_limit_mb,
        config.sandbox.output_limit_bytes,
    );

    let grading = GradingService::new(
        Arc::new(ExerciseRepository::new(db_pool.clone())),
        Arc::new(EnrollmentRepository::new(db_pool.clone())),
        Arc::new(SubmissionRepository::new(db_pool.clone())),
        Arc::new(executor),
        config.grading.clone(),
    );

    // Create application state
    let state = AppState::new(
        db_pool.clone(),
        redis_conn,
        Arc::new(grading),
        config.clone(),
    );

    // Build the router
    let app = Router::new()
        .nest(API_BASE_PATH, handlers::routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(middleware::from_fn(logging_middleware)),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state);

    // Start the server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing database pool");
    db_pool.close().await;

    Ok(())
}

/// Pick the isolation backend named in the configuration
async fn build_sandbox(config: &SandboxConfig) -> anyhow::Result<Arc<dyn Sandbox>> {
    match config.backend {
        SandboxBackend::Process => {
            tracing::info!(
                work_root = %config.work_root.display(),
                memory_limit_mb = config.memory_limit_mb,
                isolation = config.isolation,
                "Using process sandbox"
            );
            let sandbox = ProcessSandbox::new(config.clone());
            if config.isolation {
                sandbox.check_isolation().await.map_err(|e| {
                    anyhow::anyhow!(
                        "process sandbox cannot create namespaces ({}); enable unprivileged \
                         user namespaces, use SANDBOX_BACKEND=docker, or set \
                         SANDBOX_ISOLATION=false to run submissions unconfined",
                        e
                    )
                })?;
            } else {
                tracing::warn!(
                    "SANDBOX_ISOLATION=false: submissions can read host files and open network connections"
                );
            }
            Ok(Arc::new(sandbox))
        }
        SandboxBackend::Docker => {
            tracing::info!("Connecting to Docker...");
            let docker =
                Docker::connect_with_socket(&config.docker_socket, 120, bollard::API_DEFAULT_VERSION)?;

            // Verify Docker connection
            let docker_info = docker.version().await?;
            tracing::info!(
                "Connected to Docker version: {}",
                docker_info.version.unwrap_or_default()
            );

            Ok(Arc::new(DockerSandbox::new(docker, config.clone())))
        }
    }
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
