//! Keys and writes incoming batches and host reports into the metrics store.

use crate::error::ArchiveError;
use crate::model::{record_id, HostReport, LatencyBatch, LatencyRecord, ResourceSnapshot};
use crate::store::{MetricsStore, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// How archived records are keyed.
///
/// `Insert` keeps history (`{subject}-{datetime}`, duplicates rejected);
/// `Upsert` keeps only the latest record per subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    #[default]
    Insert,
    Upsert,
}

impl std::str::FromStr for KeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" | "single_insert" => Ok(Self::Insert),
            "upsert" | "single_upsert" => Ok(Self::Upsert),
            other => Err(format!("unknown key mode {other:?}")),
        }
    }
}

impl KeyMode {
    pub fn key_for(&self, subject: &str, seconds: i64) -> String {
        match self {
            KeyMode::Insert => record_id(subject, seconds),
            KeyMode::Upsert => subject.to_string(),
        }
    }
}

pub struct Archiver {
    store: Arc<dyn MetricsStore>,
    key_mode: KeyMode,
}

impl Archiver {
    pub fn new(store: Arc<dyn MetricsStore>, key_mode: KeyMode) -> Self {
        Self { store, key_mode }
    }

    pub fn key_mode(&self) -> KeyMode {
        self.key_mode
    }

    pub async fn archive_latency(&self, batch: LatencyBatch) -> Result<String, ArchiveError> {
        if batch.source.trim().is_empty() {
            return Err(ArchiveError::Validation("latency batch has no source".into()));
        }
        if batch.results.is_empty() {
            return Err(ArchiveError::Validation("latency batch has no results".into()));
        }

        let id = self.key_mode.key_for(&batch.source, batch.timestamp.seconds);
        let source = batch.source.clone();
        let record = Record::Latency(LatencyRecord { id, batch });
        let key = self.write(record).await?;
        info!(%source, %key, "latency batch archived");
        Ok(key)
    }

    /// Summarizes the report and archives it under `host`.
    pub async fn archive_resources(&self, host: &str, report: &HostReport) -> Result<String, ArchiveError> {
        if host.trim().is_empty() {
            return Err(ArchiveError::Validation("host report has no host identity".into()));
        }

        let id = self.key_mode.key_for(host, report.timestamp.seconds);
        let snapshot = ResourceSnapshot::summarize(id, host, report);
        let key = self.write(Record::Resource(snapshot)).await?;
        info!(%host, %key, "host report archived");
        Ok(key)
    }

    async fn write(&self, record: Record) -> Result<String, ArchiveError> {
        let key = match self.key_mode {
            KeyMode::Insert => self.store.put(record).await?,
            KeyMode::Upsert => self.store.upsert(record).await?,
        };
        Ok(key)
    }
}
