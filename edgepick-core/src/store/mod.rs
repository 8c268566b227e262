/**
 * METRICS STORE - Interface de persistance des mesures Edgepick
 *
 * RÔLE :
 * Ce module définit le contrat de stockage des enregistrements historiques :
 * batches de latence, instantanés de ressources et décisions de sélection.
 *
 * FONCTIONNEMENT :
 * - MetricsStore trait = interface commune (put/upsert/get/query)
 * - Record = enveloppe typée des trois familles d'enregistrements
 * - RecordQuery = requête unifiée (famille, sujet, fenêtre temporelle, limite)
 * - Résultats toujours triés du plus récent au plus ancien
 *
 * UTILITÉ POUR EDGEPICK :
 * ✅ L'archiveur écrit, l'analyseur et l'historique lisent via la même API
 * ✅ Implémentation remplaçable : LedgerStore (JSON local) ou service distant
 *
 * EXEMPLE :
 * ```ignore
 * let query = RecordQuery::new(RecordKind::Latency)
 *     .subject(Subject::ProbedHost("robot-1".into()))
 *     .within(TimeRange::trailing_minutes(now, 10).unwrap());
 * let records = store.query(&query).await?;
 * ```
 */

pub mod ledger;

use crate::error::StoreError;
use crate::model::{LatencyRecord, ResourceSnapshot, SelectionDecision, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;

/// Famille d'enregistrement, les clés sont uniques par famille
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Latency,
    Resource,
    Selection,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Latency => "latency",
            RecordKind::Resource => "resource",
            RecordKind::Selection => "selection",
        };
        f.write_str(name)
    }
}

/// Enveloppe stockée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
    Latency(LatencyRecord),
    Resource(ResourceSnapshot),
    Selection(SelectionDecision),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Latency(_) => RecordKind::Latency,
            Record::Resource(_) => RecordKind::Resource,
            Record::Selection(_) => RecordKind::Selection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Latency(r) => &r.id,
            Record::Resource(r) => &r.id,
            Record::Selection(r) => &r.id,
        }
    }

    pub fn timestamp(&self) -> &Timestamp {
        match self {
            Record::Latency(r) => &r.batch.timestamp,
            Record::Resource(r) => &r.timestamp,
            Record::Selection(r) => &r.timestamp,
        }
    }

    pub fn into_latency(self) -> Option<LatencyRecord> {
        match self {
            Record::Latency(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_resource(self) -> Option<ResourceSnapshot> {
        match self {
            Record::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_selection(self) -> Option<SelectionDecision> {
        match self {
            Record::Selection(r) => Some(r),
            _ => None,
        }
    }
}

/// Sujet d'une requête, interprété selon la famille
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Any,
    /// Latence : hôte qui a lancé les sondes
    Source(String),
    /// Latence : hôte présent dans les résultats
    ProbedHost(String),
    /// Ressources : hôte mesuré
    Host(String),
    /// Sélection : nœud demandeur
    Target(String),
    /// Sélection : serveur choisi
    Asset(String),
}

/// Intervalle semi-ouvert `[start, end)` en secondes unix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    /// Fenêtre glissante `[now - minutes, now)`, None si minutes < 0
    pub fn trailing_minutes(now: OffsetDateTime, minutes: i64) -> Option<Self> {
        if minutes < 0 {
            return None;
        }
        let end = now.unix_timestamp();
        let start = end.checked_sub(minutes.checked_mul(60)?)?;
        Some(Self { start, end })
    }

    pub fn contains(&self, seconds: i64) -> bool {
        seconds >= self.start && seconds < self.end
    }
}

/// Requête standardisée sur le store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub kind: RecordKind,
    pub subject: Subject,
    pub window: Option<TimeRange>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new(kind: RecordKind) -> Self {
        Self { kind, subject: Subject::Any, window: None, limit: None }
    }

    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    pub fn within(mut self, window: TimeRange) -> Self {
        self.window = Some(window);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Prédicat appliqué par les implémentations locales
    pub fn matches(&self, record: &Record) -> bool {
        if record.kind() != self.kind {
            return false;
        }
        if let Some(window) = &self.window {
            if !window.contains(record.timestamp().seconds) {
                return false;
            }
        }
        match (&self.subject, record) {
            (Subject::Any, _) => true,
            (Subject::Source(source), Record::Latency(r)) => &r.batch.source == source,
            (Subject::ProbedHost(host), Record::Latency(r)) => r.mentions(host),
            (Subject::Host(host), Record::Resource(r)) => &r.hostname == host,
            (Subject::Target(target), Record::Selection(r)) => &r.target == target,
            (Subject::Asset(asset), Record::Selection(r)) => &r.asset_id == asset,
            _ => false,
        }
    }
}

/// Interface commune de tous les stores de mesures
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Insère un enregistrement, refuse une clé déjà présente pour sa famille
    async fn put(&self, record: Record) -> Result<String, StoreError>;

    /// Insère ou remplace
    async fn upsert(&self, record: Record) -> Result<String, StoreError>;

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record, StoreError>;

    /// Enregistrements correspondant à la requête, du plus récent au plus ancien
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError>;
}

pub type SharedStore = Arc<dyn MetricsStore>;
