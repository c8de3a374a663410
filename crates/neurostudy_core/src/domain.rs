//! crates/neurostudy_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//!
//! Unlike a database-backed model, the persisted form of these records *is*
//! their JSON shape (the same blobs are written to local storage and to the
//! remote table), so the serde attributes here define the storage format.
//! Field names are camelCase and timestamps are Unix milliseconds.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parent id used for folders that sit directly under the library root.
pub const ROOT_FOLDER_ID: &str = "root";

/// Generates a fresh record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The current time at the millisecond precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

//=========================================================================================
// Folders and Studies
//=========================================================================================

/// A node in the folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Generation-depth preset controlling prompt verbosity and output density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyMode {
    Survival,
    #[default]
    Normal,
    Hard,
    Pareto,
}

/// The kind of material a source holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Pdf,
    Video,
    Image,
    Audio,
    Link,
}

impl SourceType {
    /// Binary sources carry base64 content or a provider file reference.
    pub fn is_binary(self) -> bool {
        !matches!(self, SourceType::Text | SourceType::Link)
    }

    /// Infers a source type from a MIME type, falling back to plain text.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.to_ascii_lowercase();
        if mime == "application/pdf" {
            SourceType::Pdf
        } else if mime.starts_with("video/") {
            SourceType::Video
        } else if mime.starts_with("image/") {
            SourceType::Image
        } else if mime.starts_with("audio/") {
            SourceType::Audio
        } else {
            SourceType::Text
        }
    }
}

/// Raw user-supplied material attached to a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySource {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    /// Plain text for textual sources, base64 for inline binaries, empty when
    /// the bytes live with the provider (see `file_uri`).
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_uri: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_added: DateTime<Utc>,
}

impl StudySource {
    /// Creates a textual source (plain text or a link).
    pub fn text(source_type: SourceType, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            source_type,
            name: name.into(),
            content: content.into(),
            mime_type: Some("text/plain".to_string()),
            file_uri: None,
            date_added: now(),
        }
    }
}

/// A user's unit of work: a titled collection of sources plus generated artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub folder_id: String,
    pub title: String,
    #[serde(default)]
    pub sources: Vec<StudySource>,
    #[serde(default)]
    pub mode: StudyMode,
    #[serde(default)]
    pub is_book: bool,
    #[serde(default)]
    pub guide: Option<StudyGuide>,
    #[serde(default)]
    pub slides: Vec<SlideContent>,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_review_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_step: Option<u32>,
}

impl StudySession {
    /// Creates an empty study inside `folder_id`.
    pub fn new(folder_id: impl Into<String>, title: impl Into<String>, mode: StudyMode, is_book: bool) -> Self {
        let now = now();
        Self {
            id: new_id(),
            folder_id: folder_id.into(),
            title: title.into(),
            sources: Vec::new(),
            mode,
            is_book,
            guide: None,
            slides: Vec::new(),
            quiz: Vec::new(),
            flashcards: Vec::new(),
            created_at: now,
            updated_at: now,
            next_review_date: None,
            review_step: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

//=========================================================================================
// Generated Artifacts
//=========================================================================================

/// The generated study guide for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGuide {
    pub subject: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

/// A generated micro-task within a study guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub mission: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub look_for: String,
    #[serde(default)]
    pub note_exactly: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// A targeted edit to a checkpoint's text. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPatch {
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub look_for: Option<String>,
    #[serde(default)]
    pub note_exactly: Option<String>,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

impl Checkpoint {
    /// Applies a targeted edit, keeping id, timestamp, diagram and completion.
    pub fn apply_patch(&mut self, patch: CheckpointPatch) {
        if let Some(mission) = patch.mission {
            self.mission = mission;
        }
        if let Some(look_for) = patch.look_for {
            self.look_for = look_for;
        }
        if let Some(note_exactly) = patch.note_exactly {
            self.note_exactly = note_exactly;
        }
        if patch.importance.is_some() {
            self.importance = patch.importance;
        }
        if patch.question.is_some() {
            self.question = patch.question;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideContent {
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: String,
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One turn of a conversation about a study guide. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

/// A file stored with the generation provider after a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub uri: String,
    pub mime_type: String,
}

//=========================================================================================
// Persistence Unit and Capabilities
//=========================================================================================

/// The full `{studies, folders}` pair that is persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(default)]
    pub studies: Vec<StudySession>,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

/// The caller's capability. Only privileged callers sync with the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    #[default]
    Standard,
    Privileged,
}

impl AccessRole {
    pub fn can_sync_remote(self) -> bool {
        matches!(self, AccessRole::Privileged)
    }
}
