use crate::archive::KeyMode;
use crate::probe::ProbeSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

pub const CONFIG_ENV: &str = "EDGEPICK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgepickConfig {
    pub gateway: GatewayConf,
    pub store: StoreConf,
    pub inventory: InventoryConf,
    pub probe: ProbeConf,
    pub archive: ArchiveConf,
    pub collector: CollectorConf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConf {
    pub listen: String, // ex: "0.0.0.0:8080"
    /// Clé attendue dans `x-api-key` ; None = API ouverte
    pub api_key: Option<String>,
}

impl Default for GatewayConf {
    fn default() -> Self {
        Self { listen: "0.0.0.0:8080".into(), api_key: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConf {
    /// None = store en mémoire
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConf {
    pub path: PathBuf,
}

impl Default for InventoryConf {
    fn default() -> Self {
        Self { path: PathBuf::from("./data/inventory.json") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConf {
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for ProbeConf {
    fn default() -> Self {
        Self { connect_timeout_secs: 5, command_timeout_secs: 10 }
    }
}

impl ProbeConf {
    pub fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConf {
    pub key_mode: KeyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConf {
    /// Identité du collecteur (id inventaire) ; défaut = hostname
    pub source: Option<String>,
    pub gateway_url: String,
    pub interval_secs: u64,
    pub targets_path: String,
    pub latency_path: String,
}

impl Default for CollectorConf {
    fn default() -> Self {
        Self {
            source: None,
            gateway_url: "http://localhost:8080".into(),
            interval_secs: 30,
            targets_path: "latency/targets".into(),
            latency_path: "latency".into(),
        }
    }
}

/// Parse un YAML de config ; vide = défauts
pub fn parse_config(txt: &str) -> Result<EdgepickConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(EdgepickConfig::default());
    }
    let mut cfg: EdgepickConfig = serde_yaml::from_str(txt)?;
    if cfg.collector.interval_secs == 0 {
        let fallback = CollectorConf::default().interval_secs;
        warn!(fallback, "collector.interval_secs = 0 refusé");
        cfg.collector.interval_secs = fallback;
    }
    Ok(cfg)
}

pub async fn load_config() -> EdgepickConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "edgepick.yaml".into());
    let mut cfg = load_config_from(Path::new(&path)).await;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

pub async fn load_config_from(path: &Path) -> EdgepickConfig {
    if !path.exists() {
        warn!(path = %path.display(), "pas de fichier de config, usage config par défaut");
        return EdgepickConfig::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config illisible, usage config par défaut");
            return EdgepickConfig::default();
        }
    };
    parse_config(&txt).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "config invalide, usage config par défaut");
        EdgepickConfig::default()
    })
}

/// Surcharges EDGEPICK_* ; `lookup` abstrait l'environnement pour les tests
pub fn apply_env_overrides<F>(cfg: &mut EdgepickConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(listen) = get("EDGEPICK_LISTEN") {
        cfg.gateway.listen = listen;
    }
    if let Some(key) = get("EDGEPICK_API_KEY") {
        cfg.gateway.api_key = Some(key);
    }
    if let Some(path) = get("EDGEPICK_STORE_PATH") {
        cfg.store.path = Some(PathBuf::from(path));
    }
    if let Some(path) = get("EDGEPICK_INVENTORY_PATH") {
        cfg.inventory.path = PathBuf::from(path);
    }
    if let Some(mode) = get("EDGEPICK_KEY_MODE") {
        match mode.parse::<KeyMode>() {
            Ok(mode) => cfg.archive.key_mode = mode,
            Err(e) => warn!(error = %e, "EDGEPICK_KEY_MODE ignoré"),
        }
    }
    if let Some(source) = get("EDGEPICK_SOURCE") {
        cfg.collector.source = Some(source);
    }
    if let Some(url) = get("EDGEPICK_GATEWAY_URL") {
        cfg.collector.gateway_url = url;
    }
    if let Some(secs) = get("EDGEPICK_INTERVAL_SECS") {
        match secs.parse::<u64>() {
            Ok(secs) if secs > 0 => cfg.collector.interval_secs = secs,
            _ => warn!(value = %secs, "EDGEPICK_INTERVAL_SECS ignoré"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = EdgepickConfig::default();
        assert_eq!(cfg.gateway.listen, "0.0.0.0:8080");
        assert_eq!(cfg.probe.settings(), ProbeSettings::default());
        assert_eq!(cfg.archive.key_mode, KeyMode::Insert);
        assert_eq!(cfg.collector.interval_secs, 30);
        assert!(cfg.store.path.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config(
            r#"
store:
  path: /var/lib/edgepick/ledger.json
archive:
  key_mode: upsert
probe:
  connect_timeout_secs: 2
"#,
        )
        .unwrap();
        assert_eq!(cfg.store.path, Some(PathBuf::from("/var/lib/edgepick/ledger.json")));
        assert_eq!(cfg.archive.key_mode, KeyMode::Upsert);
        assert_eq!(cfg.probe.connect_timeout_secs, 2);
        assert_eq!(cfg.probe.command_timeout_secs, 10);
        assert_eq!(cfg.gateway, GatewayConf::default());
    }

    #[test]
    fn test_zero_interval_in_yaml_falls_back() {
        let cfg = parse_config("collector:\n  interval_secs: 0\n").unwrap();
        assert_eq!(cfg.collector.interval_secs, 30);

        let cfg = parse_config("collector:\n  interval_secs: 5\n").unwrap();
        assert_eq!(cfg.collector.interval_secs, 5);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(parse_config("  \n").unwrap(), EdgepickConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("EDGEPICK_LISTEN", "127.0.0.1:9000"),
            ("EDGEPICK_API_KEY", "s3cret"),
            ("EDGEPICK_KEY_MODE", "single_upsert"),
            ("EDGEPICK_SOURCE", "robot-7"),
            ("EDGEPICK_INTERVAL_SECS", "0"),
            ("EDGEPICK_GATEWAY_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = EdgepickConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.gateway.listen, "127.0.0.1:9000");
        assert_eq!(cfg.gateway.api_key.as_deref(), Some("s3cret"));
        assert_eq!(cfg.archive.key_mode, KeyMode::Upsert);
        assert_eq!(cfg.collector.source.as_deref(), Some("robot-7"));
        // 0 refusé, vide ignoré
        assert_eq!(cfg.collector.interval_secs, 30);
        assert_eq!(cfg.collector.gateway_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edgepick.yaml");
        std::fs::write(&path, "gateway: [not, a, map]").unwrap();
        assert_eq!(load_config_from(&path).await, EdgepickConfig::default());

        let missing = dir.path().join("absent.yaml");
        assert_eq!(load_config_from(&missing).await, EdgepickConfig::default());
    }
}
