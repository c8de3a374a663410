//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.
//! Domain records are serialized exactly as they are persisted.

use neurostudy_core::{ChatMessage, Folder, SourceType, StudyLibrary, StudyMode, StudySession};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

//=========================================================================================
// Requests Sent FROM the Client
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    /// Defaults to the root container.
    pub parent_id: Option<String>,
}

/// Renames and/or reparents a folder. Use `"root"` to move it to the top level.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFolderRequest {
    pub name: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudyRequest {
    #[serde(default)]
    pub title: String,
    pub folder_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = String, example = "normal")]
    pub mode: StudyMode,
    #[serde(default)]
    pub is_book: bool,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudyRequest {
    pub title: Option<String>,
    pub folder_id: Option<String>,
    #[schema(value_type = Option<String>, example = "pareto")]
    pub mode: Option<StudyMode>,
    pub is_book: Option<bool>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveStudyRequest {
    /// `null` closes the current study.
    pub study_id: Option<String>,
}

/// Adds a source from JSON. Binary types carry base64 in `content`.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddSourceRequest {
    #[serde(rename = "type")]
    #[schema(value_type = String, example = "text")]
    pub source_type: SourceType,
    pub name: String,
    #[serde(default)]
    pub content: String,
    pub mime_type: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RenameSourceRequest {
    pub name: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<ChatMessage>,
    pub message: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RefineRequest {
    pub instruction: String,
}

//=========================================================================================
// Responses Sent FROM the Server
//=========================================================================================

/// The full library as the client renders it.
#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LibraryResponse {
    #[schema(value_type = Vec<Object>)]
    pub studies: Vec<StudySession>,
    #[schema(value_type = Vec<Object>)]
    pub folders: Vec<Folder>,
    pub active_study_id: Option<String>,
}

impl From<&StudyLibrary> for LibraryResponse {
    fn from(library: &StudyLibrary) -> Self {
        Self {
            studies: library.studies().to_vec(),
            folders: library.folders().to_vec(),
            active_study_id: library.active_study_id().map(str::to_string),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFolderResponse {
    pub deleted_folder_ids: Vec<String>,
    pub deleted_study_ids: Vec<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ToggleResponse {
    pub completed: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct DiagramResponse {
    pub diagram: String,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct TutorialPreference {
    pub dismissed: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub remote_sync: bool,
}
