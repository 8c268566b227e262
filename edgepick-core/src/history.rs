//! Read-side queries over archived records.

use crate::clock::SharedClock;
use crate::error::{AnalysisError, StoreError};
use crate::model::{LatencyRecord, ResourceSnapshot, SelectionDecision};
use crate::store::{MetricsStore, RecordKind, RecordQuery, Subject, TimeRange};
use std::sync::Arc;

pub struct History {
    store: Arc<dyn MetricsStore>,
    clock: SharedClock,
}

impl History {
    pub fn new(store: Arc<dyn MetricsStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    fn window(&self, minutes: i64) -> Result<TimeRange, AnalysisError> {
        TimeRange::trailing_minutes(self.clock.now(), minutes).ok_or(AnalysisError::InvalidWindow(minutes))
    }

    /// Decisions for `subject` (`Any`, `Target` or `Asset`), newest first.
    pub async fn selections(&self, subject: Subject) -> Result<Vec<SelectionDecision>, StoreError> {
        let query = RecordQuery::new(RecordKind::Selection).subject(subject);
        let records = self.store.query(&query).await?;
        Ok(records.into_iter().filter_map(|r| r.into_selection()).collect())
    }

    pub async fn selection(&self, id: &str) -> Result<SelectionDecision, StoreError> {
        let record = self.store.get(RecordKind::Selection, id).await?;
        record.into_selection().ok_or_else(|| StoreError::NotFound {
            kind: RecordKind::Selection,
            id: id.to_string(),
        })
    }

    pub async fn latency_record(&self, id: &str) -> Result<LatencyRecord, StoreError> {
        let record = self.store.get(RecordKind::Latency, id).await?;
        record.into_latency().ok_or_else(|| StoreError::NotFound {
            kind: RecordKind::Latency,
            id: id.to_string(),
        })
    }

    /// Batches sent by `source` in the window.
    pub async fn latency_by_source(&self, source: &str, minutes: i64) -> Result<Vec<LatencyRecord>, AnalysisError> {
        self.latency(Subject::Source(source.to_string()), minutes).await
    }

    /// Batches that probed `target` in the window.
    pub async fn latency_by_target(&self, target: &str, minutes: i64) -> Result<Vec<LatencyRecord>, AnalysisError> {
        self.latency(Subject::ProbedHost(target.to_string()), minutes).await
    }

    async fn latency(&self, subject: Subject, minutes: i64) -> Result<Vec<LatencyRecord>, AnalysisError> {
        let query = RecordQuery::new(RecordKind::Latency).subject(subject).within(self.window(minutes)?);
        let records = self.store.query(&query).await?;
        Ok(records.into_iter().filter_map(|r| r.into_latency()).collect())
    }

    pub async fn resources_by_host(&self, host: &str, minutes: i64) -> Result<Vec<ResourceSnapshot>, AnalysisError> {
        let query = RecordQuery::new(RecordKind::Resource)
            .subject(Subject::Host(host.to_string()))
            .within(self.window(minutes)?);
        let records = self.store.query(&query).await?;
        Ok(records.into_iter().filter_map(|r| r.into_resource()).collect())
    }
}
