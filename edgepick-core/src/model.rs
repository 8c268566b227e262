//! Wire and storage types shared by the probe, archive, analysis and selection paths.
//!
//! Field names follow the JSON payloads exchanged with collectors and the
//! gateway (camelCase, `timestamp: {timeLocal, timeSeconds, timeNano}`).

use serde::{Deserialize, Serialize};
use std::fmt;
use time::macros::format_description;
use time::OffsetDateTime;

/// Latency value recorded for a failed probe.
pub const LATENCY_SENTINEL: i64 = -1;

// ---------------------------------------------------------------------------
// Timestamps & ids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    #[serde(rename = "timeLocal", with = "time::serde::rfc3339")]
    pub local: OffsetDateTime,
    #[serde(rename = "timeSeconds")]
    pub seconds: i64,
    #[serde(rename = "timeNano")]
    pub nanos: i64,
}

impl From<OffsetDateTime> for Timestamp {
    fn from(at: OffsetDateTime) -> Self {
        Self {
            local: at,
            seconds: at.unix_timestamp(),
            nanos: i64::try_from(at.unix_timestamp_nanos()).unwrap_or(i64::MAX),
        }
    }
}

/// `{subject}-{YYYY-MM-DDTHH:MM:SS}` in UTC, from unix seconds.
pub fn record_id(subject: &str, seconds: i64) -> String {
    let layout = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let stamp = OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .and_then(|at| at.format(layout).ok())
        .unwrap_or_else(|| seconds.to_string());
    format!("{subject}-{stamp}")
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// One remote host to probe. Read-only input.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub hostname: String,
    #[serde(rename = "hostPort")]
    pub port: String,
    #[serde(rename = "hostUser")]
    pub username: String,
    #[serde(rename = "hostPassword")]
    pub password: String,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Target {
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Probe request for one cycle, as served to collectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyTargets {
    pub source: String,
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub hostname: String,
    pub latency: i64,
}

impl ProbeResult {
    pub fn failed(hostname: impl Into<String>) -> Self {
        Self { hostname: hostname.into(), latency: LATENCY_SENTINEL }
    }

    pub fn is_valid(&self) -> bool {
        self.latency > LATENCY_SENTINEL
    }
}

/// Output of one orchestration cycle: exactly one result per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyBatch {
    pub source: String,
    pub timestamp: Timestamp,
    pub results: Vec<ProbeResult>,
}

impl LatencyBatch {
    pub fn result_for(&self, hostname: &str) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.hostname == hostname)
    }
}

/// A batch as archived in the metrics store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub id: String,
    #[serde(flatten)]
    pub batch: LatencyBatch,
}

impl LatencyRecord {
    pub fn mentions(&self, hostname: &str) -> bool {
        self.batch.results.iter().any(|r| r.hostname == hostname)
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Raw host report posted by resource collectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub host: HostInfo,
    #[serde(rename = "cpuStats")]
    pub cpu: CpuStats,
    #[serde(rename = "memStats")]
    pub memory: MemStats,
    #[serde(rename = "dockerStats", default)]
    pub containers: Vec<ContainerStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInfo {
    pub hostname: String,
    pub uptime: i64,
    pub platform: String,
    pub hostid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(rename = "averageUsage")]
    pub average_usage: f64,
    #[serde(rename = "coreUsage", default)]
    pub core_usage: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub available: u64,
    pub used: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerStats {
    #[serde(rename = "containerID")]
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    #[serde(rename = "State")]
    pub state: String,
}

impl ContainerStats {
    pub fn is_running(&self) -> bool {
        self.status == "running" || self.state == "true"
    }
}

/// Summarized resource sample, the unit stored and windowed per host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: String,
    pub hostname: String,
    pub timestamp: Timestamp,
    #[serde(rename = "cpuAverageUsage")]
    pub cpu_avg: f64,
    #[serde(rename = "memoryUsePercentage")]
    pub mem_used_pct: f64,
    #[serde(rename = "containersRunning")]
    pub containers_running: i64,
}

impl ResourceSnapshot {
    pub fn summarize(id: impl Into<String>, hostname: impl Into<String>, report: &HostReport) -> Self {
        let running = report.containers.iter().filter(|c| c.is_running()).count();
        Self {
            id: id.into(),
            hostname: hostname.into(),
            timestamp: report.timestamp,
            cpu_avg: report.cpu.average_usage,
            mem_used_pct: report.memory.used,
            containers_running: i64::try_from(running).unwrap_or(i64::MAX),
        }
    }
}

// ---------------------------------------------------------------------------
// Windowed analyses
// ---------------------------------------------------------------------------

/// Latency seen by one source towards `target` over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyAnalysis {
    /// Probing source; for selection this is the candidate server id.
    pub hostname: String,
    pub target: String,
    pub duration: i64,
    #[serde(rename = "averageLatency")]
    pub average_latency: f64,
    #[serde(rename = "latencyCount")]
    pub count: usize,
    /// Raw samples, sentinels included.
    #[serde(rename = "statSummary")]
    pub samples: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAnalysis {
    pub hostname: String,
    pub duration: i64,
    #[serde(rename = "cpuAverageUsage")]
    pub cpu_average_usage: f64,
    #[serde(rename = "memoryUsePercentage")]
    pub memory_use_percentage: f64,
    #[serde(rename = "containersRunning")]
    pub containers_running: i64,
    pub count: usize,
    #[serde(rename = "statSummary")]
    pub snapshots: Vec<ResourceSnapshot>,
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AssetKind {
    Server,
    Robot,
    Sensor,
}

impl TryFrom<u8> for AssetKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Server),
            1 => Ok(Self::Robot),
            2 => Ok(Self::Sensor),
            other => Err(format!("unknown asset type {other}")),
        }
    }
}

impl From<AssetKind> for u8 {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Server => 0,
            AssetKind::Robot => 1,
            AssetKind::Sensor => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AssetState {
    Disabled,
    Enabled,
}

impl TryFrom<u8> for AssetState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Enabled),
            other => Err(format!("unknown asset state {other}")),
        }
    }
}

impl From<AssetState> for u8 {
    fn from(state: AssetState) -> Self {
        match state {
            AssetState::Disabled => 0,
            AssetState::Enabled => 1,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProperties {
    #[serde(with = "int_flag")]
    pub gpu: bool,
    pub hostname: String,
    #[serde(rename = "hostPort")]
    pub host_port: String,
    #[serde(rename = "hostUser")]
    pub host_user: String,
    #[serde(rename = "hostPassword")]
    pub host_password: String,
}

impl fmt::Debug for AssetProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetProperties")
            .field("gpu", &self.gpu)
            .field("hostname", &self.hostname)
            .field("host_port", &self.host_port)
            .field("host_user", &self.host_user)
            .finish_non_exhaustive()
    }
}

/// Inventory entry. Server-typed entries are the selection candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAsset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub state: AssetState,
    pub properties: AssetProperties,
}

pub type CandidateServer = InventoryAsset;

impl InventoryAsset {
    pub fn is_enabled(&self) -> bool {
        self.state == AssetState::Enabled
    }

    pub fn has_gpu(&self) -> bool {
        self.properties.gpu
    }

    /// Connection info as a probe target.
    pub fn as_target(&self) -> Target {
        Target {
            hostname: self.properties.hostname.clone(),
            port: self.properties.host_port.clone(),
            username: self.properties.host_user.clone(),
            password: self.properties.host_password.clone(),
        }
    }
}

/// `gpu` travels as `0|1` on the wire.
mod int_flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*flag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(de::Error::custom(format!("expected 0 or 1, got {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// A joined candidate with both analyses attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub asset: CandidateServer,
    pub target: String,
    #[serde(rename = "averageLatency")]
    pub average_latency: f64,
    #[serde(rename = "cpuAverageUsage")]
    pub cpu_average_usage: f64,
    #[serde(rename = "memoryUsePercentage")]
    pub memory_use_percentage: f64,
    #[serde(rename = "containersRunning")]
    pub containers_running: i64,
}

/// `options` is `None` unless at least two candidates survived the join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selected: Option<RankedCandidate>,
    pub options: Option<Vec<RankedCandidate>>,
}

impl SelectionOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Splits an already ranked list into the winner and its alternatives.
    pub fn from_ranked(mut ranked: Vec<RankedCandidate>) -> Self {
        if ranked.is_empty() {
            return Self::empty();
        }
        let selected = ranked.remove(0);
        let options = if ranked.is_empty() { None } else { Some(ranked) };
        Self { selected: Some(selected), options }
    }
}

/// Audit record written once per successful selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDecision {
    pub id: String,
    #[serde(rename = "assetID")]
    pub asset_id: String,
    pub target: String,
    pub timestamp: Timestamp,
    #[serde(rename = "averageLatency")]
    pub average_latency: f64,
    #[serde(rename = "cpuAverageUsage")]
    pub cpu_average_usage: f64,
    #[serde(rename = "memoryUsePercentage")]
    pub memory_use_percentage: f64,
    #[serde(rename = "containersRunning")]
    pub containers_running: i64,
}

impl SelectionDecision {
    pub fn record(chosen: &RankedCandidate, at: OffsetDateTime) -> Self {
        let timestamp = Timestamp::from(at);
        Self {
            id: record_id(&chosen.target, timestamp.seconds),
            asset_id: chosen.asset.id.clone(),
            target: chosen.target.clone(),
            timestamp,
            average_latency: chosen.average_latency,
            cpu_average_usage: chosen.cpu_average_usage,
            memory_use_percentage: chosen.memory_use_percentage,
            containers_running: chosen.containers_running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn test_record_id_layout() {
        let at = datetime!(2022-02-07 11:54:21 UTC);
        assert_eq!(record_id("robot-1", at.unix_timestamp()), "robot-1-2022-02-07T11:54:21");
    }

    #[test]
    fn test_timestamp_wire_shape() {
        let ts = Timestamp::from(datetime!(2022-02-07 11:54:21 UTC));
        let value = serde_json::to_value(ts).unwrap();
        assert_eq!(value["timeSeconds"], json!(1644234861));
        assert_eq!(value["timeNano"], json!(1644234861000000000_i64));
        assert_eq!(value["timeLocal"], json!("2022-02-07T11:54:21Z"));

        let parsed: Timestamp = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_target_debug_hides_password() {
        let target = Target {
            hostname: "edge-1".into(),
            port: "22".into(),
            username: "ops".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(target.address(), "edge-1:22");
    }

    #[test]
    fn test_inventory_asset_from_wire() {
        let asset: InventoryAsset = serde_json::from_value(json!({
            "id": "srv-1",
            "name": "edge",
            "owner": "lab",
            "type": 0,
            "state": 1,
            "properties": {
                "gpu": 1,
                "hostname": "10.0.0.4",
                "hostPort": "22",
                "hostUser": "ops",
                "hostPassword": "pw"
            }
        }))
        .unwrap();

        assert_eq!(asset.kind, AssetKind::Server);
        assert!(asset.is_enabled());
        assert!(asset.has_gpu());
        assert_eq!(asset.as_target().address(), "10.0.0.4:22");

        let back = serde_json::to_value(&asset).unwrap();
        assert_eq!(back["type"], json!(0));
        assert_eq!(back["properties"]["gpu"], json!(1));
    }

    #[test]
    fn test_inventory_asset_rejects_unknown_type() {
        let parsed = serde_json::from_value::<InventoryAsset>(json!({
            "id": "x", "type": 7, "state": 1,
            "properties": {"gpu": 0, "hostname": "", "hostPort": "", "hostUser": "", "hostPassword": ""}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_snapshot_counts_running_containers() {
        let report: HostReport = serde_json::from_value(json!({
            "timestamp": {"timeLocal": "2022-02-07T11:54:21Z", "timeSeconds": 1644234861, "timeNano": 1644234861000000000_i64},
            "host": {"hostname": "426ede137da2"},
            "cpuStats": {"averageUsage": 9.5},
            "memStats": {"total": 100, "available": 60, "used": 40.0},
            "dockerStats": [
                {"containerID": "a", "status": "running", "State": ""},
                {"containerID": "b", "status": "Up 5 minutes", "State": "true"},
                {"containerID": "c", "status": "exited", "State": "false"}
            ]
        }))
        .unwrap();

        let snapshot = ResourceSnapshot::summarize("h-1", "h", &report);
        assert_eq!(snapshot.containers_running, 2);
        assert_eq!(snapshot.cpu_avg, 9.5);
        assert_eq!(snapshot.mem_used_pct, 40.0);
        assert_eq!(snapshot.timestamp.seconds, 1644234861);
    }

    #[test]
    fn test_outcome_options_only_with_alternatives() {
        assert_eq!(SelectionOutcome::from_ranked(vec![]), SelectionOutcome::empty());

        let candidate = |id: &str| RankedCandidate {
            asset: InventoryAsset {
                id: id.into(),
                name: String::new(),
                owner: String::new(),
                kind: AssetKind::Server,
                state: AssetState::Enabled,
                properties: AssetProperties {
                    gpu: false,
                    hostname: id.into(),
                    host_port: "22".into(),
                    host_user: "u".into(),
                    host_password: "p".into(),
                },
            },
            target: "t".into(),
            average_latency: 1.0,
            cpu_average_usage: 1.0,
            memory_use_percentage: 1.0,
            containers_running: 0,
        };

        let single = SelectionOutcome::from_ranked(vec![candidate("a")]);
        assert!(single.selected.is_some());
        assert!(single.options.is_none());

        let many = SelectionOutcome::from_ranked(vec![candidate("a"), candidate("b"), candidate("c")]);
        assert_eq!(many.selected.unwrap().asset.id, "a");
        let ids: Vec<_> = many.options.unwrap().into_iter().map(|c| c.asset.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
