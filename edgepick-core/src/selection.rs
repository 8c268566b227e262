//! Multi-criteria edge-server selection
//!
//! candidates (inventory) ⨝ latency analysis (by target) ⨝ resource analysis
//! (per candidate), ranked by mean latency then mean CPU. A candidate missing
//! either analysis, or whose analysis holds no valid sample, is dropped. Only
//! a successful non-empty ranking writes a `SelectionDecision`.

use crate::analyzer::WindowAnalyzer;
use crate::clock::SharedClock;
use crate::error::SelectionError;
use crate::inventory::{AssetQuery, Inventory};
use crate::model::{CandidateServer, LatencyAnalysis, RankedCandidate, ResourceAnalysis, SelectionDecision, SelectionOutcome};
use crate::store::{MetricsStore, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub target: String,
    pub minutes: i64,
    pub gpu_required: bool,
}

pub struct SelectionEngine {
    inventory: Arc<dyn Inventory>,
    analyzer: Arc<WindowAnalyzer>,
    store: Arc<dyn MetricsStore>,
    clock: SharedClock,
}

impl SelectionEngine {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        analyzer: Arc<WindowAnalyzer>,
        store: Arc<dyn MetricsStore>,
        clock: SharedClock,
    ) -> Self {
        Self { inventory, analyzer, store, clock }
    }

    pub async fn select(&self, request: &SelectionRequest) -> Result<SelectionOutcome, SelectionError> {
        let target = request.target.trim();
        if target.is_empty() {
            return Err(SelectionError::Validation("selection target is empty".into()));
        }
        info!(%target, minutes = request.minutes, gpu = request.gpu_required, "selecting server");

        let servers = self.inventory.list(&AssetQuery::servers(request.gpu_required)).await?;
        let latency = self.analyzer.latency_for_target(target, request.minutes).await?;
        let matched = match_latency(servers, &latency);
        debug!(%target, matched = matched.len(), "candidates with latency data");

        let resources = self.resource_fan_out(&matched, request.minutes).await?;
        let mut ranked = join_candidates(target, matched, &resources);
        rank(&mut ranked);

        let Some(top) = ranked.first() else {
            info!(%target, "no candidate survived the join");
            return Ok(SelectionOutcome::empty());
        };

        let decision = SelectionDecision::record(top, self.clock.now());
        let key = self
            .store
            .put(Record::Selection(decision))
            .await
            .map_err(SelectionError::Persist)?;
        info!(%target, chosen = %top.asset.id, %key, candidates = ranked.len(), "server selected");

        Ok(SelectionOutcome::from_ranked(ranked))
    }

    /// One resource analysis per candidate, all collected before joining.
    async fn resource_fan_out(
        &self,
        matched: &[(CandidateServer, LatencyAnalysis)],
        minutes: i64,
    ) -> Result<HashMap<String, ResourceAnalysis>, SelectionError> {
        let mut tasks = JoinSet::new();
        for (server, _) in matched {
            let analyzer = Arc::clone(&self.analyzer);
            let host = server.id.clone();
            tasks.spawn(async move { analyzer.resources_for_host(&host, minutes).await });
        }

        let mut resources = HashMap::with_capacity(matched.len());
        while let Some(joined) = tasks.join_next().await {
            // dropping `tasks` on error aborts the rest
            let analysis = joined??;
            resources.insert(analysis.hostname.clone(), analysis);
        }
        Ok(resources)
    }
}

/// Inner join of servers with latency analyses on `server.id == analysis.hostname`.
fn match_latency(
    servers: Vec<CandidateServer>,
    latency: &[LatencyAnalysis],
) -> Vec<(CandidateServer, LatencyAnalysis)> {
    let by_host: HashMap<&str, &LatencyAnalysis> = latency
        .iter()
        .filter(|a| a.count > 0)
        .map(|a| (a.hostname.as_str(), a))
        .collect();

    servers
        .into_iter()
        .filter(|s| s.is_enabled())
        .filter_map(|s| {
            let analysis = by_host.get(s.id.as_str()).map(|a| (*a).clone())?;
            Some((s, analysis))
        })
        .collect()
}

fn join_candidates(
    target: &str,
    matched: Vec<(CandidateServer, LatencyAnalysis)>,
    resources: &HashMap<String, ResourceAnalysis>,
) -> Vec<RankedCandidate> {
    matched
        .into_iter()
        .filter_map(|(asset, latency)| {
            let resource = resources.get(&asset.id).filter(|r| r.count > 0)?;
            Some(RankedCandidate {
                target: target.to_string(),
                average_latency: latency.average_latency,
                cpu_average_usage: resource.cpu_average_usage,
                memory_use_percentage: resource.memory_use_percentage,
                containers_running: resource.containers_running,
                asset,
            })
        })
        .collect()
}

/// Stable sort on (latency asc, cpu asc).
pub fn rank(candidates: &mut [RankedCandidate]) {
    candidates.sort_by(|a, b| {
        a.average_latency
            .total_cmp(&b.average_latency)
            .then_with(|| a.cpu_average_usage.total_cmp(&b.cpu_average_usage))
    });
}
