//! Typed errors for every request-level failure path.
//!
//! Probe-level failures never surface here as a batch error: `ProbeFailure`
//! is logged by the probe and folded into the `-1` sentinel.

use crate::store::RecordKind;

/// Rejected before any network I/O is attempted.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("latency: no targets found")]
    NoTargets,
    #[error("latency: source identity missing, can't key the batch")]
    MissingSource,
}

/// Reason a single round-trip failed. Absorbed into a sentinel result.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("connection failed: {0}")]
    Connect(#[source] russh::Error),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("password rejected for user {0}")]
    AuthRejected(String),
    #[error("session error: {0}")]
    Session(#[source] russh::Error),
    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),
    #[error("command exited with status {0}")]
    ExitStatus(u32),
    #[error("expected marker {expected:?}, got {output:?}")]
    MarkerMismatch { expected: String, output: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} record {id} already exists")]
    AlreadyExists { kind: RecordKind, id: String },
    #[error("{kind} record {id} not found")]
    NotFound { kind: RecordKind, id: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metrics store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("asset {0} not found")]
    NotFound(String),
    #[error("asset {0} already exists")]
    AlreadyExists(String),
    #[error("invalid asset: {0}")]
    Invalid(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid window: {0} minutes")]
    InvalidWindow(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("rejected: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("rejected: {0}")]
    Validation(String),
    #[error("inventory fetch failed: {0}")]
    Inventory(#[from] InventoryError),
    #[error("analysis fetch failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("resource analysis worker died: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("failed to persist decision: {0}")]
    Persist(#[source] StoreError),
}
