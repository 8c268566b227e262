/*!
Fixtures pour tests Edgepick

Construction fluide d'équipements d'inventaire, de rapports d'hôte et de
batches de latence, sans passer par du JSON écrit à la main.
*/

use edgepick_core::model::{
    AssetKind, AssetProperties, AssetState, ContainerStats, CpuStats, HostInfo, HostReport, InventoryAsset,
    LatencyBatch, MemStats, ProbeResult, Target, Timestamp,
};
use time::OffsetDateTime;

/// Builder d'équipement : actif, sans GPU, hostname `{id}.local` par défaut
pub struct AssetBuilder {
    asset: InventoryAsset,
}

impl AssetBuilder {
    fn new(id: &str, kind: AssetKind) -> Self {
        Self {
            asset: InventoryAsset {
                id: id.to_string(),
                name: format!("{id} (test)"),
                owner: "lab".into(),
                kind,
                state: AssetState::Enabled,
                properties: AssetProperties {
                    gpu: false,
                    hostname: format!("{id}.local"),
                    host_port: "22".into(),
                    host_user: "ops".into(),
                    host_password: "secret".into(),
                },
            },
        }
    }

    pub fn server(id: &str) -> Self {
        Self::new(id, AssetKind::Server)
    }

    pub fn robot(id: &str) -> Self {
        Self::new(id, AssetKind::Robot)
    }

    pub fn sensor(id: &str) -> Self {
        Self::new(id, AssetKind::Sensor)
    }

    pub fn gpu(mut self) -> Self {
        self.asset.properties.gpu = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.asset.state = AssetState::Disabled;
        self
    }

    pub fn hostname(mut self, hostname: &str) -> Self {
        self.asset.properties.hostname = hostname.to_string();
        self
    }

    pub fn port(mut self, port: &str) -> Self {
        self.asset.properties.host_port = port.to_string();
        self
    }

    pub fn build(self) -> InventoryAsset {
        self.asset
    }
}

pub fn target(hostname: &str) -> Target {
    Target {
        hostname: hostname.to_string(),
        port: "22".into(),
        username: "ops".into(),
        password: "secret".into(),
    }
}

pub fn targets(hostnames: &[&str]) -> Vec<Target> {
    hostnames.iter().map(|h| target(h)).collect()
}

/// Batch de latence à `at`, `(hostname, latence)` par résultat
pub fn batch(source: &str, at: OffsetDateTime, results: &[(&str, i64)]) -> LatencyBatch {
    LatencyBatch {
        source: source.to_string(),
        timestamp: Timestamp::from(at),
        results: results
            .iter()
            .map(|(hostname, latency)| ProbeResult { hostname: hostname.to_string(), latency: *latency })
            .collect(),
    }
}

/// Builder de rapport d'hôte
pub struct ReportBuilder {
    report: HostReport,
}

impl ReportBuilder {
    pub fn new(hostname: &str, at: OffsetDateTime) -> Self {
        Self {
            report: HostReport {
                timestamp: Timestamp::from(at),
                host: HostInfo {
                    hostname: hostname.to_string(),
                    uptime: 3600,
                    platform: "linux".into(),
                    hostid: format!("{hostname}-id"),
                },
                cpu: CpuStats::default(),
                memory: MemStats { total: 16_000, available: 16_000, used: 0.0 },
                containers: Vec::new(),
            },
        }
    }

    pub fn cpu(mut self, average_usage: f64) -> Self {
        self.report.cpu.average_usage = average_usage;
        self
    }

    pub fn memory(mut self, used_pct: f64) -> Self {
        self.report.memory.used = used_pct;
        self
    }

    /// Ajoute `running` conteneurs actifs et `stopped` arrêtés
    pub fn containers(mut self, running: usize, stopped: usize) -> Self {
        let container = |n: usize, status: &str, state: &str| ContainerStats {
            id: format!("c{n}"),
            name: format!("svc-{n}"),
            image: "edge/worker:latest".into(),
            status: status.to_string(),
            state: state.to_string(),
        };
        let offset = self.report.containers.len();
        self.report.containers.extend((0..running).map(|n| container(offset + n, "running", "true")));
        let offset = self.report.containers.len();
        self.report.containers.extend((0..stopped).map(|n| container(offset + n, "exited", "false")));
        self
    }

    pub fn build(self) -> HostReport {
        self.report
    }
}
