use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_comfyui::api::{ComfyUIApi, EngineApi};
use relay_comfyui::client::ComfyUIClient;
use relay_comfyui::listener::{EventListener, EVENT_CHANNEL_CAPACITY};
use relay_comfyui::reconnect::ReconnectConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_api::background::job_retention;
use relay_api::config::{RelayConfig, ServerConfig};
use relay_api::engine::consumer::run_event_consumer;
use relay_api::engine::relay::JobRelay;
use relay_api::router::build_app_router;
use relay_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relay_api=debug,relay_comfyui=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let relay_config = RelayConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        engine = %relay_config.engine_host,
        input_dir = %relay_config.input_dir.display(),
        ws_reconnect = relay_config.ws_reconnect,
        "Loaded relay configuration",
    );

    // --- Engine client + relay service ---
    let engine: Arc<dyn EngineApi> = Arc::new(ComfyUIApi::new(relay_config.api_url()));
    let client = ComfyUIClient::with_random_id(relay_config.ws_url());
    let relay = Arc::new(JobRelay::new(
        engine,
        relay_config.input_dir.clone(),
        client.client_id(),
        relay_config.reconcile_max_attempts,
    ));

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let reconnect = relay_config.ws_reconnect.then(ReconnectConfig::default);
    let listener = EventListener::new(client, reconnect, event_tx);
    let listener_handle = tokio::spawn(listener.run(cancel.clone()));

    let consumer_handle = tokio::spawn(run_event_consumer(
        Arc::clone(&relay),
        event_rx,
        relay_config.reconcile_interval,
        cancel.clone(),
    ));

    let retention_handle = tokio::spawn(job_retention::run(
        relay.jobs(),
        relay_config.job_retention,
        relay_config.sweep_interval,
        cancel.clone(),
    ));
    tracing::info!("Relay services started (listener, event consumer, retention sweep)");

    // --- App state + router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        relay: Arc::clone(&relay),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    for (name, handle) in [
        ("event listener", listener_handle),
        ("event consumer", consumer_handle),
        ("retention sweep", retention_handle),
    ] {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!(task = name, "Background task did not stop in time");
        }
    }

    let depth = relay.health().await.queue_depth;
    if depth > 0 {
        tracing::warn!(depth, "Shutting down with unfinished jobs; their tracking is lost");
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
