//! Windowed aggregates over the metrics store.
//!
//! Windows are `[now - minutes, now)` on `timestamp.timeSeconds`. Latency
//! sentinels stay in the raw samples but never count towards a mean; an empty
//! window is a valid result (mean 0, count 0).

use crate::clock::SharedClock;
use crate::error::AnalysisError;
use crate::model::{LatencyAnalysis, ResourceAnalysis, ResourceSnapshot};
use crate::store::{MetricsStore, RecordKind, RecordQuery, Subject, TimeRange};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub struct WindowAnalyzer {
    store: Arc<dyn MetricsStore>,
    clock: SharedClock,
}

impl WindowAnalyzer {
    pub fn new(store: Arc<dyn MetricsStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub fn window(&self, minutes: i64) -> Result<TimeRange, AnalysisError> {
        TimeRange::trailing_minutes(self.clock.now(), minutes).ok_or(AnalysisError::InvalidWindow(minutes))
    }

    /// Latency towards `target`, one analysis per probing source, sorted by source.
    pub async fn latency_for_target(&self, target: &str, minutes: i64) -> Result<Vec<LatencyAnalysis>, AnalysisError> {
        let window = self.window(minutes)?;
        let query = RecordQuery::new(RecordKind::Latency)
            .subject(Subject::ProbedHost(target.to_string()))
            .within(window);
        let records = self.store.query(&query).await?;

        let mut by_source: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for record in records.into_iter().filter_map(|r| r.into_latency()) {
            let samples = by_source.entry(record.batch.source).or_default();
            samples.extend(
                record
                    .batch
                    .results
                    .iter()
                    .filter(|r| r.hostname == target)
                    .map(|r| r.latency),
            );
        }

        let analyses: Vec<LatencyAnalysis> = by_source
            .into_iter()
            .map(|(source, samples)| latency_analysis(source, target, minutes, samples))
            .collect();
        debug!(%target, minutes, sources = analyses.len(), "latency window analysed");
        Ok(analyses)
    }

    pub async fn resources_for_host(&self, host: &str, minutes: i64) -> Result<ResourceAnalysis, AnalysisError> {
        let window = self.window(minutes)?;
        let query = RecordQuery::new(RecordKind::Resource)
            .subject(Subject::Host(host.to_string()))
            .within(window);
        let snapshots: Vec<ResourceSnapshot> = self
            .store
            .query(&query)
            .await?
            .into_iter()
            .filter_map(|r| r.into_resource())
            .collect();

        let analysis = resource_analysis(host, minutes, snapshots);
        debug!(%host, minutes, samples = analysis.count, "resource window analysed");
        Ok(analysis)
    }
}

/// Mean over valid (non-sentinel) samples.
pub fn latency_mean(samples: &[i64]) -> (f64, usize) {
    let valid: Vec<i64> = samples.iter().copied().filter(|&l| l > crate::model::LATENCY_SENTINEL).collect();
    if valid.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = valid.iter().sum();
    (sum as f64 / valid.len() as f64, valid.len())
}

pub fn latency_analysis(source: String, target: &str, minutes: i64, samples: Vec<i64>) -> LatencyAnalysis {
    let (average_latency, count) = latency_mean(&samples);
    LatencyAnalysis {
        hostname: source,
        target: target.to_string(),
        duration: minutes,
        average_latency,
        count,
        samples,
    }
}

pub fn resource_analysis(host: &str, minutes: i64, snapshots: Vec<ResourceSnapshot>) -> ResourceAnalysis {
    let count = snapshots.len();
    let (cpu, mem, containers) = if count == 0 {
        (0.0, 0.0, 0)
    } else {
        let cpu: f64 = snapshots.iter().map(|s| s.cpu_avg).sum();
        let mem: f64 = snapshots.iter().map(|s| s.mem_used_pct).sum();
        let containers: i64 = snapshots.iter().map(|s| s.containers_running).sum();
        let n = count as f64;
        // containers: integer mean, truncated
        (cpu / n, mem / n, containers / count as i64)
    };

    ResourceAnalysis {
        hostname: host.to_string(),
        duration: minutes,
        cpu_average_usage: cpu,
        memory_use_percentage: mem,
        containers_running: containers,
        count,
        snapshots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;
    use time::OffsetDateTime;

    fn snap(cpu: f64, mem: f64, containers: i64) -> ResourceSnapshot {
        ResourceSnapshot {
            id: "x".into(),
            hostname: "h".into(),
            timestamp: Timestamp::from(OffsetDateTime::UNIX_EPOCH),
            cpu_avg: cpu,
            mem_used_pct: mem,
            containers_running: containers,
        }
    }

    #[test]
    fn test_latency_mean_skips_sentinels() {
        assert_eq!(latency_mean(&[10, 20, -1]), (15.0, 2));
        assert_eq!(latency_mean(&[0, -1]), (0.0, 1));
    }

    #[test]
    fn test_latency_mean_empty_is_zero() {
        assert_eq!(latency_mean(&[]), (0.0, 0));
        assert_eq!(latency_mean(&[-1, -1]), (0.0, 0));
    }

    #[test]
    fn test_latency_analysis_keeps_raw_samples() {
        let analysis = latency_analysis("srv-1".into(), "robot-1", 5, vec![10, -1, 20]);
        assert_eq!(analysis.samples, vec![10, -1, 20]);
        assert_eq!(analysis.count, 2);
        assert_eq!(analysis.average_latency, 15.0);
        assert_eq!(analysis.hostname, "srv-1");
        assert_eq!(analysis.target, "robot-1");
        assert_eq!(analysis.duration, 5);
    }

    #[test]
    fn test_resource_analysis_means() {
        let analysis = resource_analysis("h", 10, vec![snap(10.0, 40.0, 3), snap(30.0, 60.0, 4)]);
        assert_eq!(analysis.cpu_average_usage, 20.0);
        assert_eq!(analysis.memory_use_percentage, 50.0);
        // (3 + 4) / 2, truncated
        assert_eq!(analysis.containers_running, 3);
        assert_eq!(analysis.count, 2);
    }

    #[test]
    fn test_resource_analysis_empty_window() {
        let analysis = resource_analysis("h", 10, vec![]);
        assert_eq!(analysis.count, 0);
        assert_eq!(analysis.cpu_average_usage, 0.0);
        assert_eq!(analysis.containers_running, 0);
    }
}
