//! Edgepick core - latency probing, windowed metrics and edge-server selection
//!
//! Pipeline:
//! - `probe` / `orchestrator`: concurrent SSH round-trips, one LatencyBatch per cycle
//! - `archive` / `store`: keyed persistence of batches, host reports and decisions
//! - `analyzer`: per-subject aggregates over a trailing time window
//! - `selection`: inventory ⨝ latency ⨝ resources, ranked and audited
//!
//! The HTTP gateway and the per-host collector live in their own crates and only
//! wire these pieces together.

pub mod analyzer;
pub mod archive;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod inventory;
pub mod model;
pub mod orchestrator;
pub mod probe;
pub mod selection;
pub mod store;

pub use analyzer::WindowAnalyzer;
pub use archive::{Archiver, KeyMode};
pub use clock::{Clock, SharedClock, SystemClock};
pub use config::{load_config, EdgepickConfig};
pub use error::{AnalysisError, ArchiveError, InventoryError, ProbeError, SelectionError, StoreError};
pub use history::History;
pub use inventory::{AssetQuery, Inventory, InventoryRegistry};
pub use orchestrator::ProbeOrchestrator;
pub use probe::{ProbeOutcome, RemoteProbe, SshProbe};
pub use selection::{SelectionEngine, SelectionRequest};
pub use store::{ledger::LedgerStore, MetricsStore, Record, RecordKind, RecordQuery, Subject, TimeRange};
