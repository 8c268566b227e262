/**
 * APP STATE - Dépendances partagées par toutes les routes
 *
 * RÔLE : Câble store, inventaire, sonde et horloge une seule fois puis les
 * injecte dans les composants du cœur (archiveur, analyseur, sélection,
 * historique, orchestrateur). Clonable à bas coût pour Axum.
 */

use crate::health::HealthTracker;
use anyhow::Context;
use edgepick_core::clock::{system_clock, SharedClock};
use edgepick_core::inventory::SharedInventory;
use edgepick_core::probe::RemoteProbe;
use edgepick_core::store::SharedStore;
use edgepick_core::{
    Archiver, EdgepickConfig, History, InventoryRegistry, KeyMode, LedgerStore, ProbeOrchestrator, SelectionEngine,
    SshProbe, WindowAnalyzer,
};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub inventory: SharedInventory,
    pub archiver: Arc<Archiver>,
    pub analyzer: Arc<WindowAnalyzer>,
    pub history: Arc<History>,
    pub selector: Arc<SelectionEngine>,
    pub orchestrator: Arc<ProbeOrchestrator>,
    pub health: HealthTracker,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        inventory: SharedInventory,
        probe: Arc<dyn RemoteProbe>,
        clock: SharedClock,
        key_mode: KeyMode,
    ) -> Self {
        let analyzer = Arc::new(WindowAnalyzer::new(store.clone(), clock.clone()));
        Self {
            archiver: Arc::new(Archiver::new(store.clone(), key_mode)),
            history: Arc::new(History::new(store.clone(), clock.clone())),
            selector: Arc::new(SelectionEngine::new(inventory.clone(), analyzer.clone(), store, clock.clone())),
            orchestrator: Arc::new(ProbeOrchestrator::new(probe, clock)),
            analyzer,
            inventory,
            health: HealthTracker::new(key_mode),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }

    /// Ouvre store + inventaire décrits par la config
    pub async fn from_config(cfg: &EdgepickConfig) -> anyhow::Result<Self> {
        let store: SharedStore = match &cfg.store.path {
            Some(path) => Arc::new(
                LedgerStore::open(path)
                    .await
                    .with_context(|| format!("opening metrics store {}", path.display()))?,
            ),
            None => {
                info!("no store path configured, records kept in memory");
                Arc::new(LedgerStore::in_memory())
            }
        };

        let registry = InventoryRegistry::new(&cfg.inventory.path);
        registry
            .load_assets()
            .await
            .with_context(|| format!("loading inventory {}", cfg.inventory.path.display()))?;

        let probe = Arc::new(SshProbe::new(cfg.probe.settings()));
        let state = Self::new(store, Arc::new(registry), probe, system_clock(), cfg.archive.key_mode);
        Ok(state.with_api_key(cfg.gateway.api_key.clone()))
    }
}
