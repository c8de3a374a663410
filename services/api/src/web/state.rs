//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use neurostudy_core::ports::{ContentGenerationService, FileUploadService, PortResult};
use neurostudy_core::{AccessRole, PersistenceGateway, StudyLibrary};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    /// The in-memory library. Every mutation is persisted before the lock is released.
    pub library: Mutex<StudyLibrary>,
    pub gateway: Arc<PersistenceGateway>,
    pub generator: Arc<dyn ContentGenerationService>,
    pub uploader: Arc<dyn FileUploadService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        library: StudyLibrary,
        gateway: Arc<PersistenceGateway>,
        generator: Arc<dyn ContentGenerationService>,
        uploader: Arc<dyn FileUploadService>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            library: Mutex::new(library),
            gateway,
            generator,
            uploader,
            config,
        }
    }

    pub fn role(&self) -> AccessRole {
        self.config.access_role
    }

    /// Applies `change` to the library and saves the resulting data set.
    ///
    /// Saves run under the library lock so they reach the stores in mutation order.
    /// The change is applied to a working copy that replaces the library only after
    /// it is saved, so a failed change or save leaves memory and stores untouched.
    pub async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut StudyLibrary) -> PortResult<T>,
    ) -> PortResult<T> {
        let mut library = self.library.lock().await;
        let mut working = library.clone();
        let value = change(&mut working)?;
        self.gateway.save_data(self.role(), &working.snapshot()).await?;
        *library = working;
        Ok(value)
    }

    /// Reads from the library without persisting anything.
    pub async fn read<T>(&self, view: impl FnOnce(&StudyLibrary) -> PortResult<T>) -> PortResult<T> {
        let library = self.library.lock().await;
        view(&library)
    }

    /// Replaces the in-memory library with what the stores currently hold.
    pub async fn reload(&self) -> PortResult<()> {
        let data = self.gateway.load_data(self.role()).await?;
        info!(
            "Reloaded {} studies and {} folders",
            data.studies.len(),
            data.folders.len()
        );
        self.library.lock().await.replace_data(data);
        Ok(())
    }
}
