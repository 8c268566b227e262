//! Edgepick Collector - per-host latency collector
//!
//! Periodically asks the gateway which robots and sensors this host should
//! reach, probes them all concurrently over SSH and posts the resulting
//! LatencyBatch back for archiving.

mod agent;
mod client;
mod discovery;

use agent::Collector;
use anyhow::{Context, Result};
use client::GatewayClient;
use edgepick_core::clock::system_clock;
use edgepick_core::{load_config, ProbeOrchestrator, SshProbe};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    let source = discovery::resolve_source(&cfg.collector)
        .context("no collector source: set EDGEPICK_SOURCE or collector.source")?;

    let client = GatewayClient::new(&cfg.collector, cfg.gateway.api_key.clone())
        .context("Failed to build gateway client")?;
    let probe = Arc::new(SshProbe::new(cfg.probe.settings()));
    let orchestrator = ProbeOrchestrator::new(probe, system_clock());

    info!(%source, gateway = %cfg.collector.gateway_url, "Edgepick collector starting");
    let collector = Collector::new(source, client, orchestrator, Duration::from_secs(cfg.collector.interval_secs));
    collector
        .run(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;
    Ok(())
}
