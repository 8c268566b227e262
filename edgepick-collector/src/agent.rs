//! One collector: fetch targets, probe them, publish the batch, repeat.

use crate::client::{ClientError, GatewayClient};
use edgepick_core::{ProbeError, ProbeOrchestrator};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Gateway(#[from] ClientError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// Inventory holds nothing to probe for this source
    Idle,
    Published { key: String, targets: usize, reachable: usize },
}

pub struct Collector {
    source: String,
    client: GatewayClient,
    orchestrator: ProbeOrchestrator,
    period: Duration,
}

impl Collector {
    pub fn new(source: String, client: GatewayClient, orchestrator: ProbeOrchestrator, period: Duration) -> Self {
        Self { source, client, orchestrator, period }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let request = self.client.fetch_targets(&self.source).await?;
        if request.targets.is_empty() {
            debug!(source = %self.source, "no targets assigned");
            return Ok(CycleReport::Idle);
        }

        let batch = self.orchestrator.run(&request).await?;
        let reachable = batch.results.iter().filter(|r| r.is_valid()).count();
        let targets = batch.results.len();
        let key = self.client.publish_batch(&batch).await?;
        info!(source = %self.source, %key, targets, reachable, "batch published");
        Ok(CycleReport::Published { key, targets, reachable })
    }

    /// Runs a cycle on every tick until `shutdown` resolves. A failed cycle is
    /// logged and retried on the next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(source = %self.source, period = ?self.period, "collector loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!(source = %self.source, error = %e, "probe cycle failed");
                    }
                }
                _ = &mut shutdown => {
                    info!(source = %self.source, "collector stopping");
                    break;
                }
            }
        }
    }
}
