//! services/api/src/web/generation.rs
//!
//! Handlers that call the generation provider (guides, slides, quizzes, flashcards,
//! chat, checkpoint refinement and diagrams) plus the spaced-review endpoints.
//!
//! Provider calls run without holding the library lock. Results are written back
//! through `AppState::mutate`, so a study deleted mid-generation yields a 404.

use crate::error::ApiError;
use crate::web::protocol::{ChatRequest, ChatResponse, DiagramResponse, RefineRequest, ToggleResponse};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    response::Json,
};
use neurostudy_core::domain::now;
use neurostudy_core::{Checkpoint, GuideRequest, PortError, StudyGuide, StudySession};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// The generated artifacts that can be (re)built for a study.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    Guide,
    Slides,
    Quiz,
    Flashcards,
}

async fn load_study(state: &AppState, study_id: &str) -> Result<StudySession, ApiError> {
    Ok(state.read(|l| l.study(study_id).cloned()).await?)
}

fn require_guide(study: &StudySession) -> Result<&StudyGuide, ApiError> {
    study.guide.as_ref().ok_or_else(|| {
        PortError::InvalidInput(format!("Study {} has no guide yet; generate one first", study.id)).into()
    })
}

fn find_checkpoint(study: &StudySession, checkpoint_id: &str) -> Result<Checkpoint, ApiError> {
    require_guide(study)?
        .checkpoints
        .iter()
        .find(|c| c.id == checkpoint_id)
        .cloned()
        .ok_or_else(|| PortError::NotFound(format!("Checkpoint {} not found", checkpoint_id)).into())
}

//=========================================================================================
// Artifact Generation
//=========================================================================================

/// Generates one artifact and stores it on the study, replacing any previous one.
///
/// `guide` needs at least one source; the other artifacts are built from the guide.
#[utoipa::path(
    post,
    path = "/studies/{id}/generate/{artifact}",
    params(
        ("id" = String, Path, description = "Study id"),
        ("artifact" = String, Path, description = "One of guide, slides, quiz, flashcards")
    ),
    responses(
        (status = 200, description = "The updated study"),
        (status = 400, description = "No sources, or no guide for a derived artifact"),
        (status = 404, description = "Study not found"),
        (status = 502, description = "Provider failed or returned an unusable reply"),
        (status = 503, description = "Provider key is not configured")
    )
)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, artifact)): Path<(String, Artifact)>,
) -> Result<Json<StudySession>, ApiError> {
    let study = load_study(&state, &study_id).await?;
    info!("Generating {:?} for study {}", artifact, study_id);

    let updated = match artifact {
        Artifact::Guide => {
            if study.sources.is_empty() {
                return Err(PortError::InvalidInput(
                    "Add at least one source before generating a guide".to_string(),
                )
                .into());
            }
            let request = GuideRequest {
                title: study.title.clone(),
                sources: study.sources.clone(),
                mode: study.mode,
                is_book: study.is_book,
            };
            let guide = state.generator.generate_study_guide(&request).await?;
            info!(
                "Guide for study {} has {} checkpoints",
                study_id,
                guide.checkpoints.len()
            );
            state
                .mutate(|l| {
                    l.set_guide(&study_id, guide)?;
                    l.study(&study_id).cloned()
                })
                .await?
        }
        Artifact::Slides => {
            let slides = state.generator.generate_slides(require_guide(&study)?).await?;
            state
                .mutate(|l| {
                    l.set_slides(&study_id, slides)?;
                    l.study(&study_id).cloned()
                })
                .await?
        }
        Artifact::Quiz => {
            let quiz = state
                .generator
                .generate_quiz(require_guide(&study)?, study.mode)
                .await?;
            state
                .mutate(|l| {
                    l.set_quiz(&study_id, quiz)?;
                    l.study(&study_id).cloned()
                })
                .await?
        }
        Artifact::Flashcards => {
            let cards = state
                .generator
                .generate_flashcards(require_guide(&study)?)
                .await?;
            state
                .mutate(|l| {
                    l.set_flashcards(&study_id, cards)?;
                    l.study(&study_id).cloned()
                })
                .await?
        }
    };
    Ok(Json(updated))
}

/// Answers a question about the study's guide. The conversation is not stored.
#[utoipa::path(
    post,
    path = "/studies/{id}/chat",
    request_body = ChatRequest,
    params(("id" = String, Path, description = "Study id")),
    responses(
        (status = 200, description = "The tutor's reply", body = ChatResponse),
        (status = 400, description = "Study has no guide"),
        (status = 404, description = "Study not found")
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
    }
    let study = load_study(&state, &study_id).await?;
    let reply = state
        .generator
        .chat(require_guide(&study)?, &req.history, &req.message)
        .await?;
    Ok(Json(ChatResponse { reply }))
}

//=========================================================================================
// Checkpoints
//=========================================================================================

#[utoipa::path(
    post,
    path = "/studies/{id}/checkpoints/{checkpoint_id}/toggle",
    params(
        ("id" = String, Path, description = "Study id"),
        ("checkpoint_id" = String, Path, description = "Checkpoint id")
    ),
    responses(
        (status = 200, description = "The new completion state", body = ToggleResponse),
        (status = 404, description = "Study or checkpoint not found")
    )
)]
pub async fn toggle_checkpoint_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, checkpoint_id)): Path<(String, String)>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let completed = state
        .mutate(|l| l.toggle_checkpoint(&study_id, &checkpoint_id))
        .await?;
    Ok(Json(ToggleResponse { completed }))
}

/// Rewrites a checkpoint's text following a free-text instruction.
#[utoipa::path(
    post,
    path = "/studies/{id}/checkpoints/{checkpoint_id}/refine",
    request_body = RefineRequest,
    params(
        ("id" = String, Path, description = "Study id"),
        ("checkpoint_id" = String, Path, description = "Checkpoint id")
    ),
    responses(
        (status = 200, description = "The refined checkpoint"),
        (status = 404, description = "Study or checkpoint not found"),
        (status = 502, description = "Provider failed or returned an unusable reply")
    )
)]
pub async fn refine_checkpoint_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, checkpoint_id)): Path<(String, String)>,
    Json(req): Json<RefineRequest>,
) -> Result<Json<Checkpoint>, ApiError> {
    if req.instruction.trim().is_empty() {
        return Err(ApiError::BadRequest("Instruction cannot be empty".to_string()));
    }
    let study = load_study(&state, &study_id).await?;
    let checkpoint = find_checkpoint(&study, &checkpoint_id)?;
    let patch = state
        .generator
        .refine_checkpoint(&checkpoint, &req.instruction)
        .await?;

    let refined = state
        .mutate(|l| {
            l.update_checkpoint(&study_id, &checkpoint_id, patch)?;
            let study = l.study(&study_id)?;
            find_checkpoint(study, &checkpoint_id).map_err(|_| {
                PortError::NotFound(format!("Checkpoint {} not found", checkpoint_id))
            })
        })
        .await?;
    Ok(Json(refined))
}

#[utoipa::path(
    post,
    path = "/studies/{id}/checkpoints/{checkpoint_id}/diagram",
    params(
        ("id" = String, Path, description = "Study id"),
        ("checkpoint_id" = String, Path, description = "Checkpoint id")
    ),
    responses(
        (status = 200, description = "The stored Mermaid source", body = DiagramResponse),
        (status = 404, description = "Study or checkpoint not found"),
        (status = 502, description = "Provider failed or returned an empty diagram")
    )
)]
pub async fn diagram_handler(
    State(state): State<Arc<AppState>>,
    Path((study_id, checkpoint_id)): Path<(String, String)>,
) -> Result<Json<DiagramResponse>, ApiError> {
    let study = load_study(&state, &study_id).await?;
    let checkpoint = find_checkpoint(&study, &checkpoint_id)?;
    let diagram = state.generator.generate_diagram(&checkpoint).await?;

    let stored = diagram.clone();
    state
        .mutate(|l| l.set_checkpoint_diagram(&study_id, &checkpoint_id, stored))
        .await?;
    Ok(Json(DiagramResponse { diagram }))
}

//=========================================================================================
// Spaced Review
//=========================================================================================

/// Records a completed review and schedules the next one.
#[utoipa::path(
    post,
    path = "/studies/{id}/review",
    params(("id" = String, Path, description = "Study id")),
    responses(
        (status = 200, description = "The study with its new review date"),
        (status = 404, description = "Study not found")
    )
)]
pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    Path(study_id): Path<String>,
) -> Result<Json<StudySession>, ApiError> {
    let study = state.mutate(|l| l.record_review(&study_id, now())).await?;
    Ok(Json(study))
}

#[utoipa::path(
    get,
    path = "/reviews/due",
    responses((status = 200, description = "Studies whose review date has passed"))
)]
pub async fn due_reviews_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StudySession>>, ApiError> {
    let due: Vec<StudySession> = state
        .read(|l| Ok(l.due_for_review(now()).into_iter().cloned().collect()))
        .await?;
    Ok(Json(due))
}
