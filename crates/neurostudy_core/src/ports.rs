//! crates/neurostudy_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete stores and of the generation provider.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChatMessage, Checkpoint, CheckpointPatch, Flashcard, QuizQuestion, SlideContent, StudyGuide,
    StudyMode, StudySource, UploadedFile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing configuration: {0}")]
    Configuration(String),
    #[error("Provider returned status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// The HTTP status reported by the provider, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            PortError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

/// A string key/value store with browser local-storage semantics.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> PortResult<()>;
}

/// One row of the remote key/value table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRow {
    pub id: String,
    /// The full JSON-serialized collection.
    pub content: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// A remote table holding one row per logical key.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the rows with the given ids. Missing rows are simply absent.
    async fn fetch_rows(&self, ids: &[&str]) -> PortResult<Vec<RemoteRow>>;
    /// Inserts or replaces a row.
    async fn upsert_row(&self, row: RemoteRow) -> PortResult<()>;
}

//=========================================================================================
// Generation Ports
//=========================================================================================

/// Everything the provider needs to write a study guide.
#[derive(Debug, Clone)]
pub struct GuideRequest {
    pub title: String,
    pub sources: Vec<StudySource>,
    pub mode: StudyMode,
    pub is_book: bool,
}

#[async_trait]
pub trait ContentGenerationService: Send + Sync {
    /// Generates a study guide from the merged sources.
    async fn generate_study_guide(&self, request: &GuideRequest) -> PortResult<StudyGuide>;

    /// Generates slides. A malformed reply yields an empty deck.
    async fn generate_slides(&self, guide: &StudyGuide) -> PortResult<Vec<SlideContent>>;

    /// Generates a quiz. A malformed reply yields an empty quiz.
    async fn generate_quiz(&self, guide: &StudyGuide, mode: StudyMode) -> PortResult<Vec<QuizQuestion>>;

    /// Generates flashcards. A malformed reply yields an empty set.
    async fn generate_flashcards(&self, guide: &StudyGuide) -> PortResult<Vec<Flashcard>>;

    /// Answers a message about the guide, given the prior conversation.
    async fn chat(
        &self,
        guide: &StudyGuide,
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<String>;

    /// Rewrites one checkpoint according to a free-text instruction.
    async fn refine_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        instruction: &str,
    ) -> PortResult<CheckpointPatch>;

    /// Produces a Mermaid diagram source illustrating a checkpoint.
    async fn generate_diagram(&self, checkpoint: &Checkpoint) -> PortResult<String>;
}

#[async_trait]
pub trait FileUploadService: Send + Sync {
    /// Stores a file with the provider and returns a URI usable in generation calls.
    async fn upload_file(
        &self,
        data: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> PortResult<UploadedFile>;
}
