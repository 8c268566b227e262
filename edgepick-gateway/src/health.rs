use edgepick_core::inventory::{AssetQuery, Inventory};
use edgepick_core::{InventoryError, KeyMode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub uptime_seconds: u64,
    pub assets_registered: usize,
    pub batches_archived: u64,
    pub reports_archived: u64,
    pub selections_served: u64,
    pub key_mode: KeyMode,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    reports: AtomicU64,
    selections: AtomicU64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    key_mode: KeyMode,
    counters: Arc<Counters>,
}

impl HealthTracker {
    pub fn new(key_mode: KeyMode) -> Self {
        Self { start_time: Instant::now(), key_mode, counters: Arc::new(Counters::default()) }
    }

    pub fn batch_archived(&self) {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_archived(&self) {
        self.counters.reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn selection_served(&self) {
        self.counters.selections.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn get_health(&self, inventory: &dyn Inventory) -> Result<GatewayHealth, InventoryError> {
        let assets = inventory.list(&AssetQuery::all()).await?;
        Ok(GatewayHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            assets_registered: assets.len(),
            batches_archived: self.counters.batches.load(Ordering::Relaxed),
            reports_archived: self.counters.reports.load(Ordering::Relaxed),
            selections_served: self.counters.selections.load(Ordering::Relaxed),
            key_mode: self.key_mode,
        })
    }
}
