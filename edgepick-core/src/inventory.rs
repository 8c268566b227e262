/**
 * INVENTORY - Registre des équipements du réseau edge
 *
 * RÔLE : Serveurs candidats, robots et capteurs avec leurs infos de connexion.
 * Fournit la liste filtrée des candidats pour la sélection et la liste des
 * cibles de sonde pour chaque collecteur.
 *
 * ARCHITECTURE : Trait Inventory + registre en mémoire avec persistance JSON.
 * UTILITÉ : Source unique de vérité pour "qui peut exécuter" et "qui sonder".
 */

use crate::error::InventoryError;
use crate::model::{AssetKind, InventoryAsset, LatencyTargets};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Filtre d'inventaire (type, état, GPU, exclusion d'un id)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetQuery {
    /// Vide = tous les types
    pub kinds: Vec<AssetKind>,
    pub enabled_only: bool,
    pub gpu_only: bool,
    pub exclude_id: Option<String>,
}

impl AssetQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// Serveurs actifs ; avec `gpu_required`, seulement ceux équipés GPU
    pub fn servers(gpu_required: bool) -> Self {
        Self {
            kinds: vec![AssetKind::Server],
            enabled_only: true,
            gpu_only: gpu_required,
            exclude_id: None,
        }
    }

    pub fn robots() -> Self {
        Self { kinds: vec![AssetKind::Robot], enabled_only: true, ..Self::default() }
    }

    pub fn sensors() -> Self {
        Self { kinds: vec![AssetKind::Sensor], enabled_only: true, ..Self::default() }
    }

    /// Robots et capteurs actifs, sauf l'appelant lui-même
    pub fn probe_targets_for(source: &str) -> Self {
        Self {
            kinds: vec![AssetKind::Robot, AssetKind::Sensor],
            enabled_only: true,
            gpu_only: false,
            exclude_id: Some(source.to_string()),
        }
    }

    pub fn matches(&self, asset: &InventoryAsset) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&asset.kind))
            && (!self.enabled_only || asset.is_enabled())
            && (!self.gpu_only || asset.has_gpu())
            && self.exclude_id.as_deref() != Some(asset.id.as_str())
    }
}

/// Collaborateur inventaire consommé par la sélection et la gateway
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Résultats triés par id
    async fn list(&self, query: &AssetQuery) -> Result<Vec<InventoryAsset>, InventoryError>;
    async fn get(&self, id: &str) -> Result<InventoryAsset, InventoryError>;
    async fn create(&self, asset: InventoryAsset) -> Result<(), InventoryError>;
    async fn update(&self, asset: InventoryAsset) -> Result<(), InventoryError>;
    async fn delete(&self, id: &str) -> Result<(), InventoryError>;
}

pub type SharedInventory = Arc<dyn Inventory>;

/// Cibles de sonde d'un collecteur : robots + capteurs sauf lui-même
pub async fn latency_targets_for(inventory: &dyn Inventory, source: &str) -> Result<LatencyTargets, InventoryError> {
    let assets = inventory.list(&AssetQuery::probe_targets_for(source)).await?;
    Ok(LatencyTargets {
        source: source.to_string(),
        targets: assets.iter().map(InventoryAsset::as_target).collect(),
    })
}

pub type AssetsMap = BTreeMap<String, InventoryAsset>;

pub struct InventoryRegistry {
    assets: RwLock<AssetsMap>,
    data_file: Option<PathBuf>,
}

impl InventoryRegistry {
    pub fn new<P: Into<PathBuf>>(data_file: P) -> Self {
        Self { assets: RwLock::new(BTreeMap::new()), data_file: Some(data_file.into()) }
    }

    pub fn in_memory() -> Self {
        Self { assets: RwLock::new(BTreeMap::new()), data_file: None }
    }

    /// Charge les équipements depuis le fichier JSON de persistance
    pub async fn load_assets(&self) -> Result<usize, InventoryError> {
        let Some(path) = &self.data_file else { return Ok(0) };
        if !tokio::fs::try_exists(path).await? {
            info!(path = %path.display(), "no inventory file, starting fresh");
            return Ok(0);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let assets: Vec<InventoryAsset> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };

        let mut map = self.assets.write().await;
        *map = assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        info!(count = map.len(), path = %path.display(), "inventory loaded");
        Ok(map.len())
    }

    /// Appelée sous le verrou d'écriture : deux sauvegardes ne se croisent pas
    async fn save_assets(&self, map: &AssetsMap) -> Result<(), InventoryError> {
        let Some(path) = &self.data_file else { return Ok(()) };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let assets: Vec<&InventoryAsset> = map.values().collect();
        let content = serde_json::to_string_pretty(&assets)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    fn validate(asset: &InventoryAsset) -> Result<(), InventoryError> {
        if asset.id.trim().is_empty() {
            return Err(InventoryError::Invalid("asset id is empty".into()));
        }
        if asset.kind == AssetKind::Server && asset.properties.hostname.trim().is_empty() {
            return Err(InventoryError::Invalid(format!("server {} has no hostname", asset.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Inventory for InventoryRegistry {
    async fn list(&self, query: &AssetQuery) -> Result<Vec<InventoryAsset>, InventoryError> {
        let map = self.assets.read().await;
        Ok(map.values().filter(|a| query.matches(a)).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<InventoryAsset, InventoryError> {
        self.assets
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))
    }

    async fn create(&self, asset: InventoryAsset) -> Result<(), InventoryError> {
        Self::validate(&asset)?;
        let mut map = self.assets.write().await;
        if map.contains_key(&asset.id) {
            return Err(InventoryError::AlreadyExists(asset.id));
        }
        let id = asset.id.clone();
        map.insert(id.clone(), asset);
        if let Err(e) = self.save_assets(&map).await {
            map.remove(&id);
            return Err(e);
        }
        info!(%id, "asset registered");
        Ok(())
    }

    async fn update(&self, asset: InventoryAsset) -> Result<(), InventoryError> {
        Self::validate(&asset)?;
        let mut map = self.assets.write().await;
        let Some(slot) = map.get_mut(&asset.id) else {
            return Err(InventoryError::NotFound(asset.id));
        };
        let id = asset.id.clone();
        let previous = std::mem::replace(slot, asset);
        if let Err(e) = self.save_assets(&map).await {
            map.insert(id, previous);
            return Err(e);
        }
        info!(%id, "asset updated");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), InventoryError> {
        let mut map = self.assets.write().await;
        let Some(previous) = map.remove(id) else {
            return Err(InventoryError::NotFound(id.to_string()));
        };
        if let Err(e) = self.save_assets(&map).await {
            warn!(%id, error = %e, "delete not persisted, restoring asset");
            map.insert(id.to_string(), previous);
            return Err(e);
        }
        info!(%id, "asset removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssetProperties, AssetState};

    fn asset(id: &str, kind: AssetKind, enabled: bool, gpu: bool) -> InventoryAsset {
        InventoryAsset {
            id: id.into(),
            name: format!("{id} name"),
            owner: "lab".into(),
            kind,
            state: if enabled { AssetState::Enabled } else { AssetState::Disabled },
            properties: AssetProperties {
                gpu,
                hostname: format!("{id}.local"),
                host_port: "22".into(),
                host_user: "ops".into(),
                host_password: "pw".into(),
            },
        }
    }

    async fn seeded() -> InventoryRegistry {
        let registry = InventoryRegistry::in_memory();
        for a in [
            asset("srv-a", AssetKind::Server, true, false),
            asset("srv-b", AssetKind::Server, true, true),
            asset("srv-off", AssetKind::Server, false, true),
            asset("robot-1", AssetKind::Robot, true, false),
            asset("robot-2", AssetKind::Robot, false, false),
            asset("sensor-1", AssetKind::Sensor, true, false),
        ] {
            registry.create(a).await.unwrap();
        }
        registry
    }

    fn ids(assets: &[InventoryAsset]) -> Vec<&str> {
        assets.iter().map(|a| a.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_server_filters() {
        let registry = seeded().await;
        let all = registry.list(&AssetQuery::servers(false)).await.unwrap();
        assert_eq!(ids(&all), vec!["srv-a", "srv-b"]);

        let gpu = registry.list(&AssetQuery::servers(true)).await.unwrap();
        assert_eq!(ids(&gpu), vec!["srv-b"]);
    }

    #[tokio::test]
    async fn test_robot_and_sensor_filters() {
        let registry = seeded().await;
        assert_eq!(ids(&registry.list(&AssetQuery::robots()).await.unwrap()), vec!["robot-1"]);
        assert_eq!(ids(&registry.list(&AssetQuery::sensors()).await.unwrap()), vec!["sensor-1"]);
        assert_eq!(registry.list(&AssetQuery::all()).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_latency_targets_exclude_caller() {
        let registry = seeded().await;
        let targets = latency_targets_for(&registry, "robot-1").await.unwrap();
        assert_eq!(targets.source, "robot-1");
        let hosts: Vec<&str> = targets.targets.iter().map(|t| t.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["sensor-1.local"]);
    }

    #[tokio::test]
    async fn test_crud_errors() {
        let registry = seeded().await;

        let dup = registry.create(asset("srv-a", AssetKind::Server, true, false)).await;
        assert!(matches!(dup, Err(InventoryError::AlreadyExists(_))));

        let missing = registry.update(asset("ghost", AssetKind::Robot, true, false)).await;
        assert!(matches!(missing, Err(InventoryError::NotFound(_))));

        let blank = registry.create(asset(" ", AssetKind::Robot, true, false)).await;
        assert!(matches!(blank, Err(InventoryError::Invalid(_))));

        registry.delete("robot-2").await.unwrap();
        assert!(matches!(registry.get("robot-2").await, Err(InventoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_changes_state() {
        let registry = seeded().await;
        let mut srv = registry.get("srv-off").await.unwrap();
        srv.state = AssetState::Enabled;
        registry.update(srv).await.unwrap();

        let gpu = registry.list(&AssetQuery::servers(true)).await.unwrap();
        assert_eq!(ids(&gpu), vec!["srv-b", "srv-off"]);
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");

        let registry = InventoryRegistry::new(&path);
        registry.create(asset("srv-a", AssetKind::Server, true, true)).await.unwrap();
        registry.create(asset("robot-1", AssetKind::Robot, true, false)).await.unwrap();

        let reloaded = InventoryRegistry::new(&path);
        assert_eq!(reloaded.load_assets().await.unwrap(), 2);
        assert!(reloaded.get("srv-a").await.unwrap().has_gpu());
    }
}
