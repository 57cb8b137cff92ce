mod config;
mod devices;
mod discord;
mod timestamp;
mod webhook;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use config::Config;
use devices::DeviceNames;
use discord::Webhook;

#[derive(Clone)]
pub struct AppState {
    pub device_names: Arc<DeviceNames>,
    pub webhook: Webhook,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (development); in production the service
    // manager provides the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "protect_relay=info,tower_http=info".into()),
        )
        .init();

    let Config {
        webhook_url,
        device_names,
        listen_host,
        listen_port,
        forward_timeout,
        max_body_bytes,
    } = Config::from_env()?;

    let webhook = Webhook::new(webhook_url, forward_timeout)?;
    info!(
        webhook_host = webhook.host(),
        devices = device_names.len(),
        timeout_secs = forward_timeout.as_secs(),
        "Forwarding alarms to Discord"
    );
    if device_names.is_empty() {
        info!("No device names configured, alerts will show raw device ids");
    }

    let state = AppState {
        device_names: Arc::new(device_names),
        webhook,
    };
    let app = app(state, max_body_bytes);

    let listener = tokio::net::TcpListener::bind((listen_host.as_str(), listen_port))
        .await
        .with_context(|| format!("bind {listen_host}:{listen_port}"))?;
    info!("protect-relay listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("protect-relay stopped");
    Ok(())
}

fn app(state: AppState, max_body_bytes: usize) -> Router {
    webhook::router()
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let client_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.split(',').next())
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|| "-".into());
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        client_ip = %client_ip,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining requests");
}
