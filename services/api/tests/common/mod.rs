//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext wiring the router to in-memory stores
//! - A scripted generation provider and a recording uploader

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;
use bytes::Bytes;

use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use neurostudy_core::memory::{MemoryLocalStore, MemoryRemoteStore};
use neurostudy_core::ports::{ContentGenerationService, FileUploadService, GuideRequest, PortResult};
use neurostudy_core::{
    AccessRole, ChatMessage, Checkpoint, CheckpointPatch, Flashcard, PersistenceGateway,
    QuizQuestion, SlideContent, StudyGuide, StudyLibrary, StudyMode, UploadedFile,
};

//=========================================================================================
// Fake Provider
//=========================================================================================

/// Returns canned artifacts and counts how often it was called.
#[derive(Default)]
pub struct FakeGenerator {
    pub guide_calls: AtomicUsize,
    pub last_guide_request: Mutex<Option<GuideRequest>>,
}

fn checkpoint(id: &str, mission: &str) -> Checkpoint {
    Checkpoint {
        id: id.to_string(),
        mission: mission.to_string(),
        timestamp: None,
        look_for: "The phases in order".to_string(),
        note_exactly: "PMAT".to_string(),
        importance: None,
        question: None,
        diagram: None,
        completed: false,
    }
}

#[async_trait]
impl ContentGenerationService for FakeGenerator {
    async fn generate_study_guide(&self, request: &GuideRequest) -> PortResult<StudyGuide> {
        self.guide_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_guide_request.lock().unwrap() = Some(request.clone());
        Ok(StudyGuide {
            subject: request.title.clone(),
            overview: "How one cell becomes two.".to_string(),
            checkpoints: vec![
                checkpoint("cp-1", "Read about prophase"),
                checkpoint("cp-2", "Read about anaphase"),
            ],
        })
    }

    async fn generate_slides(&self, guide: &StudyGuide) -> PortResult<Vec<SlideContent>> {
        Ok(vec![SlideContent {
            title: guide.subject.clone(),
            bullets: vec!["Prophase".to_string(), "Anaphase".to_string()],
            speaker_notes: None,
        }])
    }

    async fn generate_quiz(&self, _guide: &StudyGuide, mode: StudyMode) -> PortResult<Vec<QuizQuestion>> {
        let count = if mode == StudyMode::Survival { 1 } else { 2 };
        Ok((0..count)
            .map(|i| QuizQuestion {
                id: format!("q-{}", i),
                question: "Which phase comes first?".to_string(),
                options: vec!["Prophase".to_string(), "Telophase".to_string()],
                correct_index: 0,
                explanation: String::new(),
            })
            .collect())
    }

    async fn generate_flashcards(&self, _guide: &StudyGuide) -> PortResult<Vec<Flashcard>> {
        Ok(vec![Flashcard {
            id: "f-1".to_string(),
            front: "PMAT".to_string(),
            back: "Prophase, metaphase, anaphase, telophase".to_string(),
        }])
    }

    async fn chat(
        &self,
        guide: &StudyGuide,
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<String> {
        Ok(format!(
            "[{}|{} prior] {}",
            guide.subject,
            history.len(),
            message
        ))
    }

    async fn refine_checkpoint(
        &self,
        _checkpoint: &Checkpoint,
        instruction: &str,
    ) -> PortResult<CheckpointPatch> {
        Ok(CheckpointPatch {
            mission: Some(format!("Refined: {}", instruction)),
            ..Default::default()
        })
    }

    async fn generate_diagram(&self, _checkpoint: &Checkpoint) -> PortResult<String> {
        Ok("graph TD; A-->B".to_string())
    }
}

/// Records uploads instead of sending them anywhere.
#[derive(Default)]
pub struct RecordingUploader {
    pub uploads: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl FileUploadService for RecordingUploader {
    async fn upload_file(
        &self,
        data: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> PortResult<UploadedFile> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((display_name.to_string(), mime_type.to_string(), data.len()));
        Ok(UploadedFile {
            uri: format!("https://files.test/{}", uploads.len()),
            mime_type: mime_type.to_string(),
        })
    }
}

//=========================================================================================
// Test Context
//=========================================================================================

/// Test context containing the stores, the fakes and the shared state.
pub struct TestContext {
    pub local: Arc<MemoryLocalStore>,
    pub remote: Arc<MemoryRemoteStore>,
    pub generator: Arc<FakeGenerator>,
    pub uploader: Arc<RecordingUploader>,
    pub state: Arc<AppState>,
}

impl TestContext {
    /// A privileged context with a remote table and a tiny inline upload limit.
    pub async fn new() -> Self {
        Self::with_stores(
            Arc::new(MemoryLocalStore::default()),
            Arc::new(MemoryRemoteStore::default()),
            AccessRole::Privileged,
        )
        .await
    }

    /// Builds a context over existing stores, loading whatever they hold.
    pub async fn with_stores(
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        role: AccessRole,
    ) -> Self {
        let config = Arc::new(Config {
            access_role: role,
            inline_upload_limit: 64,
            ..Config::default()
        });
        let gateway = Arc::new(
            PersistenceGateway::new(local.clone())
                .with_remote(remote.clone())
                .with_policy(config.sync_policy),
        );
        let data = gateway
            .load_data(role)
            .await
            .expect("Failed to load test data");

        let generator = Arc::new(FakeGenerator::default());
        let uploader = Arc::new(RecordingUploader::default());
        let state = Arc::new(AppState::new(
            StudyLibrary::from_data(data),
            gateway,
            generator.clone(),
            uploader.clone(),
            config,
        ));

        Self {
            local,
            remote,
            generator,
            uploader,
            state,
        }
    }

    /// Get a test server over the full router.
    pub fn server(&self) -> TestServer {
        TestServer::new(router(self.state.clone())).unwrap()
    }
}
