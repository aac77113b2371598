//! Madrona forum server.
//!
//! # Architecture
//!
//! - Axum web framework with Askama server-side rendering
//! - `PostgreSQL` via sqlx for all persistence
//! - Cookie sessions (tower-sessions, Postgres-backed) holding a pointer
//!   to a server-issued session token; a static per-user API key is the
//!   alternative credential for non-browser clients
//! - One background dispatcher task drains the bounded notification queue
//!   and performs periodic maintenance

#![cfg_attr(not(test), forbid(unsafe_code))]

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use madrona_forum::config::ForumConfig;
use madrona_forum::db;
use madrona_forum::db::notifications::PgNotificationStore;
use madrona_forum::db::tokens::ExpiredTokenSweeper;
use madrona_forum::middleware::create_session_layer;
use madrona_forum::routes;
use madrona_forum::services::notifications::pipeline;
use madrona_forum::state::AppState;

#[tokio::main]
async fn main() {
    // Load configuration from environment
    let config = ForumConfig::from_env().expect("Failed to load configuration");

    // Initialize tracing with EnvFilter
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "madrona_forum=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // Run schema migrations, then let the session store create its table
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    PostgresStore::new(pool.clone())
        .migrate()
        .await
        .expect("Failed to migrate session store");
    tracing::info!("Migrations applied");

    // Start the notification dispatcher
    let (queue, dispatcher, dispatcher_shutdown) = pipeline(
        PgNotificationStore::new(pool.clone()),
        ExpiredTokenSweeper::new(pool.clone()),
        config.queue_capacity,
        config.maintenance_interval,
    );
    let dispatcher_task = tokio::spawn(dispatcher.run());

    // Build application state
    let state = AppState::new(config.clone(), pool, queue);

    // Create session layer
    let session_layer = create_session_layer(state.pool(), state.config());

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = config.socket_addr();
    tracing::info!("forum listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Stop the dispatcher once the server has drained. A delivery already
    // pulled from the queue completes before the loop observes this.
    dispatcher_shutdown.shutdown();
    let _ = dispatcher_task.await;
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
