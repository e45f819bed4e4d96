//! Box office server.
//!
//! Serves the HTTP API, exposes Prometheus metrics on a separate listener
//! and, when enabled, sweeps lapsed offers in the background.
//!
//! # Usage
//!
//! ```bash
//! # Mock processor, defaults everywhere
//! cargo run --bin server
//!
//! # Real processor
//! PROCESSOR_SECRET_KEY=sk_test_... cargo run --bin server
//! ```

use axum::{Router, routing::get};
use boxoffice_core::payment_processor::{
    HttpPaymentProcessor, MockPaymentProcessor, PaymentProcessor,
};
use boxoffice_core::store::InMemoryLedgerStore;
use boxoffice_core::{BoxOffice, Config, SystemClock};
use boxoffice_web::{AppState, build_router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting box office server...");

    let config = Config::from_env();
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        processor = %config.processor.api_url,
        live_processor = config.processor.secret_key.is_some(),
        "Configuration loaded"
    );

    let metrics = PrometheusBuilder::new().install_recorder()?;
    boxoffice_core::metrics::register_business_metrics();

    let processor: Arc<dyn PaymentProcessor> = match &config.processor.secret_key {
        Some(secret_key) => Arc::new(HttpPaymentProcessor::new(
            secret_key.clone(),
            config.processor.api_url.clone(),
        )),
        None => {
            tracing::warn!("No processor secret key configured, using the mock processor");
            Arc::new(MockPaymentProcessor::new())
        }
    };
    let office = BoxOffice::from_config(
        &config,
        Arc::new(InMemoryLedgerStore::new()),
        processor,
        Arc::new(SystemClock),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    if config.server.sweep_interval > 0 {
        tasks.push(tokio::spawn(run_sweeper(
            office.clone(),
            Duration::from_secs(config.server.sweep_interval),
            shutdown_rx.clone(),
        )));
    }
    tasks.push(tokio::spawn(serve_metrics(
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port),
        metrics,
        shutdown_rx,
    )));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, build_router(AppState::new(office)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, stopping background tasks...");
    let _ = shutdown_tx.send(true);

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    for (idx, handle) in tasks.into_iter().enumerate() {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => tracing::info!(task = idx, "Background task stopped"),
            Ok(Err(e)) => tracing::warn!(task = idx, error = %e, "Background task failed"),
            Err(_) => tracing::warn!(task = idx, "Background task shutdown timed out"),
        }
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Periodically records lapsed offers and promotes waiting buyers.
async fn run_sweeper(office: BoxOffice, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match office.sweep_expired_offers().await {
                    Ok(report) if report.expired > 0 || report.promoted > 0 => tracing::info!(
                        events = report.events,
                        expired = report.expired,
                        promoted = report.promoted,
                        "Offer sweep"
                    ),
                    Ok(_) => {}
                    Err(error) => tracing::warn!(%error, "Offer sweep failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Serves `/metrics` for Prometheus scraping.
async fn serve_metrics(addr: String, handle: PrometheusHandle, mut shutdown: watch::Receiver<bool>) {
    let app = Router::new().route("/metrics", get(move || async move { handle.render() }));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%addr, %error, "Failed to bind metrics listener");
            return;
        }
    };
    tracing::info!(%addr, "Metrics server listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await;
    if let Err(error) = result {
        tracing::error!(%error, "Metrics server failed");
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "Failed to install Ctrl+C handler");
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
                tracing::error!(%error, "Failed to install SIGTERM handler");
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
