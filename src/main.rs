//! uptime-probe - HTTP uptime checks with failure escalation.
//!
//! Each `POST /check` probes one host, records the measurements and notifies
//! a topic when the target crosses its failure threshold or recovers.

mod check;
mod config;
mod db;
mod escalation;
mod notify;
mod probe;
#[cfg(test)]
mod testutil;
mod web;

use check::Checker;
use config::Config;
use db::Store;
use notify::WebhookPublisher;
use probe::Prober;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptime_probe=info".parse()?))
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Starting uptime-probe on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::open(
        &cfg.db_path,
        &cfg.status_table,
        cfg.results_table.as_deref(),
    )?);
    tracing::info!("Database initialized successfully");

    let mut checker = Checker::new(Prober::new()?, store.clone(), cfg.timeout(), cfg.fail_threshold);

    match &cfg.results_table {
        Some(table) => {
            tracing::info!("Storing raw results in table {}", table);
            checker = checker.with_results(store.clone());
        }
        None => tracing::info!("Raw result persistence disabled"),
    }

    match &cfg.topic_url {
        Some(topic) => {
            tracing::info!("Publishing status changes to {}", topic);
            checker = checker.with_publisher(Arc::new(WebhookPublisher::new(topic, cfg.timeout())?));
        }
        None => tracing::info!("Notifications disabled"),
    }

    tracing::info!(
        "Probe timeout {}s, failure threshold {}",
        cfg.timeout_secs,
        cfg.fail_threshold
    );

    let server = Server::new(cfg, store, Arc::new(checker));
    server.start().await?;

    Ok(())
}
