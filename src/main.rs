//! healthwatch - Service Health Monitoring
//!
//! Probes a fixed set of HTTP targets on a fixed interval, tracks
//! sustained failures as incidents and dispatches webhook alerts.

mod alert;
mod config;
mod db;
mod incident;
mod metrics;
mod monitor;
mod notify;
mod probe;
mod scheduler;
mod web;

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alert::AlertDispatcher;
use config::Config;
use db::Store;
use incident::IncidentTracker;
use monitor::MonitoringEngine;
use notify::{Notifier, WebhookNotifier};
use scheduler::Scheduler;
use web::{AppState, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("healthwatch=info".parse()?),
        )
        .init();

    // Load configuration; any validation error is fatal before the loop starts.
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HEALTHWATCH_CONFIG").ok())
        .unwrap_or_else(|| "healthwatch.toml".to_string());
    let config = Config::load(&config_path)?;

    tracing::info!("starting healthwatch with config {}", config_path);
    tracing::info!(
        "monitoring {} target(s) every {:.1}s, failure threshold {}",
        config.targets.len(),
        config.monitoring.check_interval,
        config.monitoring.failure_threshold
    );

    let store = Arc::new(Store::new(&config.db_path)?);
    tracing::info!("incident store ready at {}", config.db_path);

    let client = reqwest::Client::builder().build()?;

    let webhook = WebhookNotifier::new(&config.notifier, client.clone());
    tracing::info!(
        "webhook notifications {}",
        if webhook.enabled() { "enabled" } else { "disabled" }
    );
    let notifier: Arc<dyn Notifier> = Arc::new(webhook);

    let engine = MonitoringEngine::new(config.targets.clone(), client);
    let tracker = IncidentTracker::new(store.clone());
    let dispatcher = Arc::new(Mutex::new(AlertDispatcher::new(
        notifier,
        config.alerts.cooldown_seconds,
        config.alerts.history_capacity,
    )));

    let scheduler = Scheduler::new(engine, tracker, dispatcher.clone(), store.clone(), &config);
    let snapshot = scheduler.snapshot_handle();

    // Cooperative shutdown: ctrl-c flips the stop signal, the loop exits
    // at the next cycle boundary.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {}", e);
        } else {
            tracing::info!("shutdown requested");
        }
        let _ = stop_tx.send(true);
    });

    let server = Server::new(
        config.http_port,
        AppState {
            snapshot,
            store,
            dispatcher,
        },
    );
    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            tracing::error!("status API error: {}", e);
        }
    });

    scheduler.run(stop_rx).await;

    Ok(())
}
