/*!
Test Harness pour le pipeline Edgepick

Facilite l'écriture de tests de bout en bout avec:
- Store et inventaire en mémoire déjà câblés
- Horloge fixe partagée par l'analyseur, la sélection et l'historique
- Injection de pannes (lecture, écriture) et comptage des écritures
- Helpers pour enregistrer latences et rapports "il y a N secondes"
*/

use crate::fixtures::{batch, ReportBuilder};
use crate::probe_stub::{FixedClock, MockProbe};
use anyhow::Result;
use async_trait::async_trait;
use edgepick_core::clock::{Clock, SharedClock};
use edgepick_core::error::{InventoryError, StoreError};
use edgepick_core::inventory::{AssetQuery, Inventory};
use edgepick_core::model::InventoryAsset;
use edgepick_core::store::{MetricsStore, Record, RecordKind, RecordQuery};
use edgepick_core::{Archiver, History, InventoryRegistry, KeyMode, LedgerStore, ProbeOrchestrator, SelectionEngine, WindowAnalyzer};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time::macros::datetime;
use time::OffsetDateTime;

/// Instant de référence des harness
pub const HARNESS_NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

/// LedgerStore en mémoire avec pannes à la demande
pub struct FaultyStore {
    inner: LedgerStore,
    failing_reads: Mutex<HashSet<RecordKind>>,
    failing_writes: Mutex<HashSet<RecordKind>>,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: LedgerStore::in_memory(),
            failing_reads: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Les `get`/`query` sur `kind` échouent
    pub fn fail_reads(&self, kind: RecordKind) {
        self.failing_reads.lock().insert(kind);
    }

    pub fn fail_writes(&self, kind: RecordKind) {
        self.failing_writes.lock().insert(kind);
    }

    pub fn heal(&self) {
        self.failing_reads.lock().clear();
        self.failing_writes.lock().clear();
    }

    /// Écritures réussies depuis la création
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn check(&self, set: &Mutex<HashSet<RecordKind>>, kind: RecordKind) -> Result<(), StoreError> {
        if set.lock().contains(&kind) {
            return Err(StoreError::Unavailable(format!("injected {kind} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for FaultyStore {
    async fn put(&self, record: Record) -> Result<String, StoreError> {
        self.check(&self.failing_writes, record.kind())?;
        let key = self.inner.put(record).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    async fn upsert(&self, record: Record) -> Result<String, StoreError> {
        self.check(&self.failing_writes, record.kind())?;
        let key = self.inner.upsert(record).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record, StoreError> {
        self.check(&self.failing_reads, kind)?;
        self.inner.get(kind, id).await
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        self.check(&self.failing_reads, query.kind)?;
        self.inner.query(query).await
    }
}

/// Inventaire toujours injoignable
pub struct FailingInventory;

#[async_trait]
impl Inventory for FailingInventory {
    async fn list(&self, _query: &AssetQuery) -> Result<Vec<InventoryAsset>, InventoryError> {
        Err(InventoryError::Unavailable("injected inventory failure".into()))
    }

    async fn get(&self, id: &str) -> Result<InventoryAsset, InventoryError> {
        Err(InventoryError::Unavailable(format!("injected failure reading {id}")))
    }

    async fn create(&self, _asset: InventoryAsset) -> Result<(), InventoryError> {
        Err(InventoryError::Unavailable("injected inventory failure".into()))
    }

    async fn update(&self, _asset: InventoryAsset) -> Result<(), InventoryError> {
        Err(InventoryError::Unavailable("injected inventory failure".into()))
    }

    async fn delete(&self, id: &str) -> Result<(), InventoryError> {
        Err(InventoryError::Unavailable(format!("injected failure deleting {id}")))
    }
}

/// Harness complet : store + inventaire + horloge + composants câblés
pub struct TestHarness {
    pub clock: Arc<FixedClock>,
    pub store: Arc<FaultyStore>,
    pub inventory: Arc<InventoryRegistry>,
    pub archiver: Archiver,
    pub analyzer: Arc<WindowAnalyzer>,
    pub history: History,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_key_mode(KeyMode::Insert)
    }

    pub fn with_key_mode(key_mode: KeyMode) -> Self {
        init_tracing();

        let clock = Arc::new(FixedClock::at(HARNESS_NOW));
        let store = Arc::new(FaultyStore::new());
        let shared_clock: SharedClock = clock.clone();
        let metrics: Arc<dyn MetricsStore> = store.clone();

        Self {
            archiver: Archiver::new(metrics.clone(), key_mode),
            analyzer: Arc::new(WindowAnalyzer::new(metrics.clone(), shared_clock.clone())),
            history: History::new(metrics, shared_clock),
            inventory: Arc::new(InventoryRegistry::in_memory()),
            store,
            clock,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn shared_clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn engine(&self) -> SelectionEngine {
        self.engine_with(self.inventory.clone())
    }

    /// Moteur branché sur un autre inventaire (ex: FailingInventory)
    pub fn engine_with(&self, inventory: Arc<dyn Inventory>) -> SelectionEngine {
        SelectionEngine::new(inventory, self.analyzer.clone(), self.store.clone(), self.shared_clock())
    }

    pub fn orchestrator(&self, probe: &MockProbe) -> ProbeOrchestrator {
        ProbeOrchestrator::new(probe.shared(), self.shared_clock())
    }

    pub async fn seed(&self, assets: impl IntoIterator<Item = InventoryAsset>) -> Result<()> {
        for asset in assets {
            self.inventory.create(asset).await?;
        }
        Ok(())
    }

    /// Archive un batch de `source` daté de `seconds_ago` avant maintenant
    pub async fn record_latency(&self, source: &str, seconds_ago: i64, results: &[(&str, i64)]) -> Result<String> {
        let at = self.now() - time::Duration::seconds(seconds_ago);
        Ok(self.archiver.archive_latency(batch(source, at, results)).await?)
    }

    /// Archive un rapport de `host` daté de `seconds_ago` avant maintenant
    pub async fn record_resources(
        &self,
        host: &str,
        seconds_ago: i64,
        cpu: f64,
        mem: f64,
        containers_running: usize,
    ) -> Result<String> {
        let at = self.now() - time::Duration::seconds(seconds_ago);
        let report = ReportBuilder::new(host, at)
            .cpu(cpu)
            .memory(mem)
            .containers(containers_running, 0)
            .build();
        Ok(self.archiver.archive_resources(host, &report).await?)
    }

    pub async fn record_count(&self, kind: RecordKind) -> Result<usize> {
        Ok(self.store.inner.query(&RecordQuery::new(kind)).await?.len())
    }
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs vers la sortie capturée des tests, RUST_LOG respecté
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("edgepick_core=debug")),
        )
        .with_test_writer()
        .try_init()
        .ok();
}

/// Macro pour créer facilement des scénarios sur un harness neuf
#[macro_export]
macro_rules! scenario_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test]
        async fn $name() {
            async fn scenario($harness: &$crate::test_utils::TestHarness) -> $crate::anyhow::Result<()> $body

            let harness = $crate::test_utils::TestHarness::new();
            if let Err(e) = scenario(&harness).await {
                panic!("scenario '{}' failed: {:#}", stringify!($name), e);
            }
        }
    };
}
