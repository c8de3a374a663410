//! crates/neurostudy_core/src/memory.rs
//!
//! In-memory implementations of the storage ports. Used by tests and by
//! ephemeral deployments that do not need anything to survive a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{LocalStore, PortError, PortResult, RemoteRow, RemoteStore};

fn poisoned() -> PortError {
    PortError::Storage("in-memory store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    items: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        let items = self.items.lock().map_err(|_| poisoned())?;
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        let mut items = self.items.lock().map_err(|_| poisoned())?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A remote table that can be switched offline to simulate network failures.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    rows: Mutex<BTreeMap<String, RemoteRow>>,
    reachable: AtomicBool,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
        }
    }
}

impl MemoryRemoteStore {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// All stored rows, ordered by id.
    pub fn rows(&self) -> Vec<RemoteRow> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_reachable(&self) -> PortResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PortError::Storage("remote store unreachable".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_rows(&self, ids: &[&str]) -> PortResult<Vec<RemoteRow>> {
        self.ensure_reachable()?;
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(ids.iter().filter_map(|id| rows.get(*id).cloned()).collect())
    }

    async fn upsert_row(&self, row: RemoteRow) -> PortResult<()> {
        self.ensure_reachable()?;
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        rows.insert(row.id.clone(), row);
        Ok(())
    }
}
