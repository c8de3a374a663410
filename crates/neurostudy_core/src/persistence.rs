//! crates/neurostudy_core/src/persistence.rs
//!
//! The persistence gateway: hides the local store / remote table pair behind
//! `load_data` and `save_data`.
//!
//! The local store is always written and always read first. The remote table
//! is consulted only for privileged callers when one is configured, and its
//! failures never reach the caller.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::{AccessRole, DataSet, Folder, StudySession};
use crate::ports::{LocalStore, PortError, PortResult, RemoteRow, RemoteStore};

pub const STUDIES_KEY: &str = "neuro_studies_data";
pub const FOLDERS_KEY: &str = "neuro_folders_data";
pub const VERSION_KEY: &str = "neuro_data_version";
pub const TUTORIAL_KEY: &str = "neuro_tutorial_dismissed";

pub const REMOTE_STUDIES_ID: &str = "studies";
pub const REMOTE_FOLDERS_ID: &str = "folders";

/// How remote content is reconciled with local content on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Any remote row replaces the local value for its key.
    #[default]
    RemoteWins,
    /// The side with the higher version counter wins. Equal versions with
    /// different content are reported as a conflict and resolved to remote.
    LastWriteWins,
}

impl std::str::FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote-wins" | "remote_wins" => Ok(SyncPolicy::RemoteWins),
            "last-write-wins" | "last_write_wins" | "lww" => Ok(SyncPolicy::LastWriteWins),
            other => Err(format!("'{}' is not a sync policy", other)),
        }
    }
}

pub struct PersistenceGateway {
    local: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    policy: SyncPolicy,
}

impl PersistenceGateway {
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self {
            local,
            remote: None,
            policy: SyncPolicy::default(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn remote_for(&self, role: AccessRole) -> Option<&Arc<dyn RemoteStore>> {
        if role.can_sync_remote() {
            self.remote.as_ref()
        } else {
            None
        }
    }

    //=====================================================================================
    // Load
    //=====================================================================================

    /// Loads `{studies, folders}`, reconciling with the remote table when allowed.
    pub async fn load_data(&self, role: AccessRole) -> PortResult<DataSet> {
        let studies_raw = self.local.get_item(STUDIES_KEY).await?;
        let folders_raw = self.local.get_item(FOLDERS_KEY).await?;
        let local_version = self.local_version().await?;

        let mut data = DataSet {
            studies: decode_collection::<StudySession>(STUDIES_KEY, studies_raw.as_deref()),
            folders: decode_collection::<Folder>(FOLDERS_KEY, folders_raw.as_deref()),
        };

        let Some(remote) = self.remote_for(role) else {
            return Ok(data);
        };

        let rows = match remote.fetch_rows(&[REMOTE_STUDIES_ID, REMOTE_FOLDERS_ID]).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Remote load failed, keeping local data: {}", e);
                return Ok(data);
            }
        };

        let mut seen_version = local_version;
        for row in rows {
            seen_version = seen_version.max(row.version);
            let local_raw = match row.id.as_str() {
                REMOTE_STUDIES_ID => studies_raw.as_deref(),
                REMOTE_FOLDERS_ID => folders_raw.as_deref(),
                other => {
                    warn!("Ignoring unexpected remote row '{}'", other);
                    continue;
                }
            };
            if !self.remote_row_wins(&row, local_raw, local_version) {
                continue;
            }
            match row.id.as_str() {
                REMOTE_STUDIES_ID => match serde_json::from_str(&row.content) {
                    Ok(studies) => data.studies = studies,
                    Err(e) => error!("Remote studies row is not valid JSON: {}", e),
                },
                _ => match serde_json::from_str(&row.content) {
                    Ok(folders) => data.folders = folders,
                    Err(e) => error!("Remote folders row is not valid JSON: {}", e),
                },
            }
        }

        // Later saves must number above every version this device has seen.
        if seen_version > local_version {
            self.local
                .set_item(VERSION_KEY, &seen_version.to_string())
                .await?;
        }

        info!(
            "Loaded {} studies and {} folders (remote sync, {:?})",
            data.studies.len(),
            data.folders.len(),
            self.policy
        );
        Ok(data)
    }

    fn remote_row_wins(&self, row: &RemoteRow, local_raw: Option<&str>, local_version: u64) -> bool {
        match self.policy {
            SyncPolicy::RemoteWins => true,
            SyncPolicy::LastWriteWins => {
                if row.version > local_version {
                    true
                } else if row.version < local_version {
                    debug!(
                        "Local '{}' is newer (v{} > v{}), keeping local",
                        row.id, local_version, row.version
                    );
                    false
                } else {
                    if local_raw.is_some_and(|local| local != row.content) {
                        warn!(
                            "Conflict on '{}': local and remote both at v{} with different content, using remote",
                            row.id, row.version
                        );
                    }
                    true
                }
            }
        }
    }

    async fn local_version(&self) -> PortResult<u64> {
        let raw = self.local.get_item(VERSION_KEY).await?;
        Ok(raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
    }

    //=====================================================================================
    // Save
    //=====================================================================================

    /// Writes both collections locally, then best-effort to the remote table.
    pub async fn save_data(&self, role: AccessRole, data: &DataSet) -> PortResult<()> {
        let studies_json = encode_collection(&data.studies)?;
        let folders_json = encode_collection(&data.folders)?;
        let version = self.local_version().await? + 1;

        self.local.set_item(STUDIES_KEY, &studies_json).await?;
        self.local.set_item(FOLDERS_KEY, &folders_json).await?;
        self.local.set_item(VERSION_KEY, &version.to_string()).await?;

        let Some(remote) = self.remote_for(role) else {
            return Ok(());
        };

        let now = Utc::now();
        for (id, content) in [(REMOTE_STUDIES_ID, studies_json), (REMOTE_FOLDERS_ID, folders_json)] {
            let row = RemoteRow {
                id: id.to_string(),
                content,
                version,
                updated_at: now,
            };
            if let Err(e) = remote.upsert_row(row).await {
                error!("Remote save of '{}' failed, local copy kept: {}", id, e);
            }
        }
        Ok(())
    }

    //=====================================================================================
    // Preferences
    //=====================================================================================

    pub async fn is_tutorial_dismissed(&self) -> PortResult<bool> {
        Ok(self.local.get_item(TUTORIAL_KEY).await?.as_deref() == Some("true"))
    }

    pub async fn dismiss_tutorial(&self) -> PortResult<()> {
        self.local.set_item(TUTORIAL_KEY, "true").await
    }
}

fn decode_collection<T: DeserializeOwned>(key: &str, raw: Option<&str>) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!("Local value for '{}' is not valid JSON, starting empty: {}", key, e);
            Vec::new()
        }
    }
}

fn encode_collection<T: Serialize>(items: &[T]) -> PortResult<String> {
    serde_json::to_string(items).map_err(|e| PortError::Unexpected(e.to_string()))
}
