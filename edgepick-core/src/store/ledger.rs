/**
 * LEDGER STORE - Stockage local des enregistrements Edgepick
 *
 * RÔLE :
 * Implémentation par défaut de MetricsStore : un registre append-only des
 * batches de latence, instantanés de ressources et décisions de sélection.
 *
 * FONCTIONNEMENT :
 * - Cache mémoire indexé par (famille, id) protégé par parking_lot
 * - Persistance optionnelle dans un fichier JSON (tableau d'enveloppes)
 * - put refuse les doublons, upsert remplace
 * - Les écritures disque sont sérialisées pour garder l'ordre des snapshots
 *
 * DONNÉES EXEMPLE :
 * ```json
 * [{"kind": "selection", "record": {"id": "robot-1-2024-01-01T00:00:00", "assetID": "srv-2", ...}}]
 * ```
 */

use super::{MetricsStore, Record, RecordKind, RecordQuery};
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type RecordKey = (RecordKind, String);

pub struct LedgerStore {
    /// Fichier JSON de persistance, None = mémoire seule
    storage_path: Option<PathBuf>,
    cache: Mutex<HashMap<RecordKey, Record>>,
    /// Sérialise les écritures disque
    flush_lock: tokio::sync::Mutex<()>,
}

impl LedgerStore {
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            cache: Mutex::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Ouvre (ou crée) un store persistant
    pub async fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let path = storage_path.into();
        let store = Self {
            storage_path: Some(path.clone()),
            cache: Mutex::new(HashMap::new()),
            flush_lock: tokio::sync::Mutex::new(()),
        };
        let loaded = store.load_from_disk(&path).await?;
        info!(path = %path.display(), records = loaded, "ledger store opened");
        Ok(store)
    }

    async fn load_from_disk(&self, path: &Path) -> Result<usize, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, "[]").await?;
        }

        let content = tokio::fs::read_to_string(path).await?;
        let records: Vec<Record> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };

        let mut cache = self.cache.lock();
        cache.clear();
        for record in records {
            cache.insert((record.kind(), record.id().to_string()), record);
        }
        Ok(cache.len())
    }

    async fn save_to_disk(&self) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else { return Ok(()) };
        let _guard = self.flush_lock.lock().await;
        let json = {
            let cache = self.cache.lock();
            let mut records: Vec<&Record> = cache.values().collect();
            records.sort_by(|a, b| (a.kind(), a.id()).cmp(&(b.kind(), b.id())));
            serde_json::to_string_pretty(&records)?
        };
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[async_trait]
impl MetricsStore for LedgerStore {
    async fn put(&self, record: Record) -> Result<String, StoreError> {
        let kind = record.kind();
        let id = record.id().to_string();
        {
            let mut cache = self.cache.lock();
            let key = (kind, id.clone());
            if cache.contains_key(&key) {
                return Err(StoreError::AlreadyExists { kind, id });
            }
            cache.insert(key, record);
        }
        if let Err(e) = self.save_to_disk().await {
            self.cache.lock().remove(&(kind, id.clone()));
            warn!(%kind, %id, error = %e, "flush failed, record dropped");
            return Err(e);
        }
        debug!(%kind, %id, "record written");
        Ok(id)
    }

    async fn upsert(&self, record: Record) -> Result<String, StoreError> {
        let kind = record.kind();
        let id = record.id().to_string();
        let key = (kind, id.clone());
        let previous = self.cache.lock().insert(key.clone(), record);
        let replaced = previous.is_some();
        if let Err(e) = self.save_to_disk().await {
            let mut cache = self.cache.lock();
            match previous {
                Some(old) => cache.insert(key, old),
                None => cache.remove(&key),
            };
            warn!(%kind, %id, error = %e, "flush failed, previous value restored");
            return Err(e);
        }
        debug!(%kind, %id, replaced, "record upserted");
        Ok(id)
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Record, StoreError> {
        self.cache
            .lock()
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound { kind, id: id.to_string() })
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, StoreError> {
        let mut results: Vec<Record> = {
            let cache = self.cache.lock();
            cache.values().filter(|r| query.matches(r)).cloned().collect()
        };

        // Tri par timestamp décroissant, id en départage
        results.sort_by(|a, b| {
            let (ta, tb) = (a.timestamp(), b.timestamp());
            (tb.seconds, tb.nanos)
                .cmp(&(ta.seconds, ta.nanos))
                .then_with(|| a.id().cmp(b.id()))
        });

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }
}
