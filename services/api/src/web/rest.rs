//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the library endpoints (folders, studies, sources,
//! preferences) and the master definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::generation;
use crate::web::protocol::*;
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use neurostudy_core::domain::{new_id, now};
use neurostudy_core::generation::{default_mime, should_upload};
use neurostudy_core::{PortError, SourceType, StudySource};
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        get_library_handler,
        reload_library_handler,
        create_folder_handler,
        update_folder_handler,
        delete_folder_handler,
        create_study_handler,
        update_study_handler,
        delete_study_handler,
        set_active_study_handler,
        add_source_handler,
        upload_source_handler,
        rename_source_handler,
        delete_source_handler,
        get_tutorial_handler,
        dismiss_tutorial_handler,
        generation::generate_handler,
        generation::chat_handler,
        generation::toggle_checkpoint_handler,
        generation::refine_checkpoint_handler,
        generation::diagram_handler,
        generation::review_handler,
        generation::due_reviews_handler,
    ),
    components(
        schemas(
            CreateFolderRequest, UpdateFolderRequest, CreateStudyRequest, UpdateStudyRequest,
            SetActiveStudyRequest, AddSourceRequest, RenameSourceRequest, ChatRequest,
            RefineRequest, LibraryResponse, DeleteFolderResponse, ChatResponse, ToggleResponse,
            DiagramResponse, TutorialPreference, HealthResponse
        )
    ),
    tags(
        (name = "NeuroStudy API", description = "Study library management and AI-generated study material.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Health and Library
//=========================================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        remote_sync: state.gateway.has_remote() && state.role().can_sync_remote(),
    })
}

/// Returns every study and folder plus the open study.
#[utoipa::path(
    get,
    path = "/library",
    responses((status = 200, description = "The full library", body = LibraryResponse))
)]
pub async fn get_library_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let library = state.read(|l| Ok(LibraryResponse::from(l))).await?;
    Ok(Json(library))
}

/// Reloads the library from the stores, applying the configured sync policy.
#[utoipa::path(
    post,
    path = "/library/reload",
    responses((status = 200, description = "The reloaded library", body = LibraryResponse))
)]
pub async fn reload_library_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LibraryResponse>, ApiError> {
    state.reload().await?;
    get_library_handler(State(state)).await
}

//=========================================================================================
// Folders
//=========================================================================================

#[utoipa::path(
    post,
    path = "/folders",
    request_body = CreateFolderRequest,
    responses(
        (status = 201, description = "Folder created"),
        (status = 400, description = "Empty name"),
        (status = 404, description = "Parent folder not found")
    )
)]
pub async fn create_folder_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = state
        .mutate(|l| l.create_folder(&req.name, req.parent_id.as_deref()))
        .await?;
    info!("Created folder '{}' ({})", folder.name, folder.id);
    Ok((StatusCode::CREATED, Json(folder)))
}

#[utoipa::path(
    patch,
    path = "/folders/{id}",
    request_body = UpdateFolderRequest,
    params(("id" = String, Path, description = "Folder id")),
    responses(
        (status = 200, description = "Folder updated"),
        (status = 400, description = "Empty name or move into own subtree"),
        (status = 404, description = "Folder not found")
    )
)]
pub async fn update_folder_handler(
    State(state): State<Arc<AppState>>,
    Path(folder_id): Path<String>,
    Json(req): Json<UpdateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = state
        .mutate(|l| {
            if let Some(name) = &req.name {
                l.rename_folder(&folder_id, name)?;
            }
            if let Some(parent) = &req.parent_id {
                l.move_folder(&folder_id, Some(parent))?;
            }
            l.folder(&folder_id).cloned()
        })
        .await?;
    Ok(Json(folder))
}

/// Deletes a folder together with its subfolders and every study inside them.
#[utoipa::path(
    delete,
    path = "/folders/{id}",
    params(("id" = String, Path, description = "Folder id")),
    responses(
        (status = 200, description = "Folder subtree deleted", body = DeleteFolderResponse),
        (status = 404, description = "Folder not found")
    )
)]
pub async fn delete_folder_handler(
    State(state): State<Arc<AppState>>,
    Path(folder_id): Path<String>,
) -> Result<Json<DeleteFolderResponse>, ApiError> {
    let deleted = state.mutate(|l| l.delete_folder(&folder_id)).await?;
    Ok(Json(DeleteFolderResponse {
        deleted_folder_ids: deleted.folder_ids,
        deleted_study_ids: deleted.study_ids,
    }))
}

//=========================================================================================
// Studies
//=========================================================================================

#[utoipa::path(
    post,
    path = "/studies",
    request_body = CreateStudyRequest,
    responses(
        (status = 201, description = "Study created"),
        (status = 404, description = "Folder not found")
    )
)]
pub async fn create_study_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateStudyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let study = state
        .mutate(|l| l.create_study(&req.title, req.folder_id.as_deref(), req.mode, req.is_book))
        .await?;
    info!("Created study '{}' ({})", study.title, study.id);
    Ok((StatusCode::CREATED, Json(study)))
}

#[utoipa::path(
    patch,
    path = "/studies/{id}",
    request_body = UpdateStudyRequest,
    params(("id" = String, Path, description = "Study id")),
    responses(
        (status = 200, description = "Study updated"),
        (status = 404, description = "Study or folder not found")
    )
)]
pub async fn update_study_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<String>,
    Json(req): Json<UpdateStudyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let study = state
        .mutate(|l| {
            if let Some(title) = &req.title {
                l.rename_study(&study_id, title)?;
            }
            if let Some(folder) = &req.folder_id {
                l.move_study(&study_id, Some(folder))?;
            }
            if req.mode.is_some() || req.is_book.is_some() {
                let current = l.study(&study_id)?;
                let mode = req.mode.unwrap_or(current.mode);
                let is_book = req.is_book.unwrap_or(current.is_book);
                l.set_mode(&study_id, mode, is_book)?;
            }
            l.study(&study_id).cloned()
        })
        .await?;
    Ok(Json(study))
}

#[utoipa::path(
    delete,
    path = "/studies/{id}",
    params(("id" = String, Path, description = "Study id")),
    responses(
        (status = 204, description = "Study deleted"),
        (status = 404, description = "Study not found")
    )
)]
pub async fn delete_study_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.mutate(|l| l.delete_study(&study_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/active-study",
    request_body = SetActiveStudyRequest,
    responses(
        (status = 200, description = "Selection updated", body = LibraryResponse),
        (status = 404, description = "Study not found")
    )
)]
pub async fn set_active_study_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetActiveStudyRequest>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let library = state
        .mutate(|l| {
            l.set_active_study(req.study_id.as_deref())?;
            Ok(LibraryResponse::from(&*l))
        })
        .await?;
    Ok(Json(library))
}

//=========================================================================================
// Sources
//=========================================================================================

/// Builds a binary source, uploading it to the provider when it is too large to inline.
async fn binary_source(
    state: &AppState,
    source_type: SourceType,
    name: String,
    mime_type: String,
    data: Bytes,
) -> Result<StudySource, ApiError> {
    let mut source = StudySource {
        id: new_id(),
        source_type,
        name,
        content: String::new(),
        mime_type: Some(mime_type.clone()),
        file_uri: None,
        date_added: now(),
    };

    if should_upload(source_type, data.len(), state.config.inline_upload_limit) {
        let uploaded = state
            .uploader
            .upload_file(data, &mime_type, &source.name)
            .await?;
        source.file_uri = Some(uploaded.uri);
        source.mime_type = Some(uploaded.mime_type);
    } else {
        source.content = BASE64.encode(&data);
    }
    Ok(source)
}

async fn attach_source(
    state: &AppState,
    study_id: &str,
    source: StudySource,
) -> Result<(StatusCode, Json<StudySource>), ApiError> {
    info!(
        "Adding {:?} source '{}' to study {}",
        source.source_type, source.name, study_id
    );
    let added = source.clone();
    state.mutate(|l| l.add_source(study_id, source)).await?;
    Ok((StatusCode::CREATED, Json(added)))
}

/// Adds a source from JSON. Binary sources send base64 in `content`.
#[utoipa::path(
    post,
    path = "/studies/{id}/sources",
    request_body = AddSourceRequest,
    params(("id" = String, Path, description = "Study id")),
    responses(
        (status = 201, description = "Source added"),
        (status = 400, description = "Empty or undecodable content"),
        (status = 404, description = "Study not found")
    )
)]
pub async fn add_source_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<String>,
    Json(req): Json<AddSourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Fail before any upload work if the study is gone.
    state.read(|l| l.study(&study_id).map(|_| ())).await?;

    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Source content cannot be empty".to_string()));
    }
    let source = if req.source_type.is_binary() {
        let data = BASE64
            .decode(req.content.trim())
            .map_err(|e| ApiError::BadRequest(format!("Content is not valid base64: {}", e)))?;
        let mime_type = req
            .mime_type
            .unwrap_or_else(|| default_mime(req.source_type).to_string());
        binary_source(&state, req.source_type, req.name, mime_type, Bytes::from(data)).await?
    } else {
        StudySource::text(req.source_type, req.name, req.content)
    };
    attach_source(&state, &study_id, source).await
}

/// Adds a source from a multipart file upload.
///
/// The form carries a `file` part and optional `name` and `type` text parts. When
/// `type` is omitted it is inferred from the file's content type.
#[utoipa::path(
    post,
    path = "/studies/{id}/sources/file",
    request_body(content_type = "multipart/form-data", description = "The source file to add."),
    params(("id" = String, Path, description = "Study id")),
    responses(
        (status = 201, description = "Source added"),
        (status = 400, description = "Missing file or unreadable text"),
        (status = 404, description = "Study not found"),
        (status = 502, description = "Provider upload failed")
    )
)]
pub async fn upload_source_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    state.read(|l| l.study(&study_id).map(|_| ())).await?;

    let mut name: Option<String> = None;
    let mut explicit_type: Option<SourceType> = None;
    let mut file: Option<(String, Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
    {
        match field.name() {
            Some("name") => {
                name = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?);
            }
            Some("type") => {
                let raw = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                let parsed = serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
                    .map_err(|_| ApiError::BadRequest(format!("Unknown source type '{}'", raw)))?;
                explicit_type = Some(parsed);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("Untitled source").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
                file = Some((file_name, content_type, data));
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("Multipart form must include a file".to_string()))?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    let source_type = explicit_type
        .unwrap_or_else(|| SourceType::from_mime(content_type.as_deref().unwrap_or("text/plain")));
    let name = name.filter(|n| !n.trim().is_empty()).unwrap_or(file_name);

    let source = if source_type.is_binary() {
        let mime_type = content_type.unwrap_or_else(|| default_mime(source_type).to_string());
        binary_source(&state, source_type, name, mime_type, data).await?
    } else {
        let text = String::from_utf8(data.to_vec()).map_err(|e| {
            ApiError::BadRequest(format!("Uploaded file is not valid UTF-8 text: {}", e))
        })?;
        StudySource::text(source_type, name, text)
    };
    attach_source(&state, &study_id, source).await
}

#[utoipa::path(
    patch,
    path = "/studies/{id}/sources/{source_id}",
    request_body = RenameSourceRequest,
    params(
        ("id" = String, Path, description = "Study id"),
        ("source_id" = String, Path, description = "Source id")
    ),
    responses(
        (status = 200, description = "Source renamed"),
        (status = 404, description = "Study or source not found")
    )
)]
pub async fn rename_source_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, source_id)): Path<(String, String)>,
    Json(req): Json<RenameSourceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let study = state
        .mutate(|l| {
            l.rename_source(&study_id, &source_id, &req.name)?;
            l.study(&study_id).cloned()
        })
        .await?;
    Ok(Json(study))
}

#[utoipa::path(
    delete,
    path = "/studies/{id}/sources/{source_id}",
    params(
        ("id" = String, Path, description = "Study id"),
        ("source_id" = String, Path, description = "Source id")
    ),
    responses(
        (status = 204, description = "Source removed"),
        (status = 404, description = "Study or source not found")
    )
)]
pub async fn delete_source_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, source_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.mutate(|l| l.remove_source(&study_id, &source_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Preferences
//=========================================================================================

#[utoipa::path(
    get,
    path = "/preferences/tutorial",
    responses((status = 200, description = "Whether the tutorial was dismissed", body = TutorialPreference))
)]
pub async fn get_tutorial_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TutorialPreference>, ApiError> {
    let dismissed = state.gateway.is_tutorial_dismissed().await?;
    Ok(Json(TutorialPreference { dismissed }))
}

/// Dismisses the tutorial. Dismissal cannot be undone through the API.
#[utoipa::path(
    put,
    path = "/preferences/tutorial",
    request_body = TutorialPreference,
    responses(
        (status = 200, description = "Tutorial dismissed", body = TutorialPreference),
        (status = 400, description = "Attempted to re-enable the tutorial")
    )
)]
pub async fn dismiss_tutorial_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TutorialPreference>,
) -> Result<Json<TutorialPreference>, ApiError> {
    if !req.dismissed {
        return Err(PortError::InvalidInput("The tutorial can only be dismissed".to_string()).into());
    }
    state.gateway.dismiss_tutorial().await?;
    Ok(Json(TutorialPreference { dismissed: true }))
}
