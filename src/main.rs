//! safe-parallelism service
//!
//! Serves the idempotent processing endpoint and the version-checked issue
//! endpoints.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging filter (default: `safe_parallelism=debug,tower_http=debug`)
//! - `LOG_FORMAT`: `text` (default) | `json`
//! - `WORKER_THREADS`: Number of tokio worker threads (default: logical CPU count)
//! - `HOST`, `PORT` and the idempotency/issue settings documented in
//!   [`safe_parallelism::infrastructure::config`]

use std::env;

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use safe_parallelism::api::{AppState, router};
use safe_parallelism::infrastructure::AppConfig;

/// Result of parsing `WORKER_THREADS` environment variable.
struct WorkerThreadsResult {
    threads: Option<usize>,
    warning_emitted: bool,
}

fn parse_worker_threads() -> WorkerThreadsResult {
    let Ok(value) = env::var("WORKER_THREADS") else {
        return WorkerThreadsResult {
            threads: None,
            warning_emitted: false,
        };
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return WorkerThreadsResult {
            threads: None,
            warning_emitted: false,
        };
    }

    match trimmed.parse::<usize>() {
        Ok(0) => {
            eprintln!("Warning: WORKER_THREADS=0 is invalid (must be > 0), using default");
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
        Ok(threads) => WorkerThreadsResult {
            threads: Some(threads),
            warning_emitted: false,
        },
        Err(error) => {
            eprintln!(
                "Warning: WORKER_THREADS='{trimmed}' is not a valid number ({error}), using default"
            );
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();

    let result = parse_worker_threads();
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if let Some(threads) = result.threads {
        builder.worker_threads(threads);
        eprintln!("Tokio worker_threads set to: {threads}");
    } else if !result.warning_emitted {
        eprintln!("Tokio worker_threads: using default (logical CPU count)");
    }

    let runtime = builder.build().expect("Failed to create tokio runtime");
    runtime.block_on(async_main());
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "safe_parallelism=debug,tower_http=debug".into());
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn async_main() {
    init_tracing();

    tracing::info!("Starting safe-parallelism service");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Configuration error");
            std::process::exit(1);
        }
    };

    tracing::info!(
        window = ?config.idempotency.window,
        operation_timeout = ?config.idempotency.operation_timeout,
        sweep_interval = ?config.sweep_interval,
        processing_delay = ?config.processing_delay,
        update_delay = ?config.update_delay,
        "Configuration loaded"
    );

    let address = match config.server.socket_addr() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address");
            std::process::exit(1);
        }
    };

    let sweep_interval = config.sweep_interval;
    let state = AppState::in_memory(config);
    let sweeper = state.idempotency.spawn_sweeper(sweep_interval);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let application = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    sweeper.abort();
    tracing::info!("Server shutdown complete");
}

/// Completes on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
