//! Fan-out / fan-in of one probe cycle.
//!
//! One task per target, a bounded channel as the collector, and a barrier that
//! only releases once every worker has reported or dropped its sender. A
//! worker that dies without reporting is recorded as a failed probe, so the
//! batch always holds exactly one result per target.

use crate::clock::SharedClock;
use crate::error::ProbeError;
use crate::model::{LatencyBatch, LatencyTargets, ProbeResult, Target, Timestamp};
use crate::probe::RemoteProbe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ProbeOrchestrator {
    probe: Arc<dyn RemoteProbe>,
    clock: SharedClock,
}

impl ProbeOrchestrator {
    pub fn new(probe: Arc<dyn RemoteProbe>, clock: SharedClock) -> Self {
        Self { probe, clock }
    }

    pub async fn run(&self, request: &LatencyTargets) -> Result<LatencyBatch, ProbeError> {
        self.probe_targets(&request.source, &request.targets).await
    }

    pub async fn probe_targets(&self, source: &str, targets: &[Target]) -> Result<LatencyBatch, ProbeError> {
        if targets.is_empty() {
            return Err(ProbeError::NoTargets);
        }
        if source.trim().is_empty() {
            return Err(ProbeError::MissingSource);
        }

        let marker = new_marker();
        debug!(%source, targets = targets.len(), %marker, "dispatching probes");

        let (tx, mut rx) = mpsc::channel::<(usize, ProbeResult)>(targets.len());
        for (index, target) in targets.iter().cloned().enumerate() {
            let tx = tx.clone();
            let probe = Arc::clone(&self.probe);
            let marker = marker.clone();
            tokio::spawn(async move {
                let outcome = probe.execute(&target, &marker).await;
                let result = ProbeResult { hostname: target.hostname, latency: outcome.latency_ms };
                if tx.send((index, result)).await.is_err() {
                    debug!("batch collector gone, dropping result");
                }
            });
        }
        // only workers hold senders now; recv() ends once all of them are done
        drop(tx);

        let mut slots: Vec<Option<ProbeResult>> = vec![None; targets.len()];
        while let Some((index, result)) = rx.recv().await {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }

        let results: Vec<ProbeResult> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    warn!(host = %target.hostname, "probe worker died without reporting");
                    ProbeResult::failed(target.hostname.as_str())
                })
            })
            .collect();

        let completed = self.clock.now();
        let reachable = results.iter().filter(|r| r.is_valid()).count();
        info!(%source, total = results.len(), reachable, "probe cycle complete");

        Ok(LatencyBatch {
            source: source.to_string(),
            timestamp: Timestamp::from(completed),
            results,
        })
    }
}

fn new_marker() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id.chars().take(8).collect()
}
