pub mod generation;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use generation::*;
use rest::*;
use state::AppState;

/// Upper bound for a source upload body, JSON or multipart.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Builds the API router. CORS and the Swagger UI are layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    let library_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/library", get(get_library_handler))
        .route("/library/reload", post(reload_library_handler))
        .route("/folders", post(create_folder_handler))
        .route(
            "/folders/{id}",
            patch(update_folder_handler).delete(delete_folder_handler),
        )
        .route("/studies", post(create_study_handler))
        .route(
            "/studies/{id}",
            patch(update_study_handler).delete(delete_study_handler),
        )
        .route("/active-study", put(set_active_study_handler))
        .route(
            "/studies/{id}/sources/{source_id}",
            patch(rename_source_handler).delete(delete_source_handler),
        )
        .route(
            "/preferences/tutorial",
            get(get_tutorial_handler).put(dismiss_tutorial_handler),
        );

    let upload_routes = Router::new()
        .route("/studies/{id}/sources", post(add_source_handler))
        .route("/studies/{id}/sources/file", post(upload_source_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let generation_routes = Router::new()
        .route("/studies/{id}/generate/{artifact}", post(generate_handler))
        .route("/studies/{id}/chat", post(chat_handler))
        .route(
            "/studies/{id}/checkpoints/{checkpoint_id}/toggle",
            post(toggle_checkpoint_handler),
        )
        .route(
            "/studies/{id}/checkpoints/{checkpoint_id}/refine",
            post(refine_checkpoint_handler),
        )
        .route(
            "/studies/{id}/checkpoints/{checkpoint_id}/diagram",
            post(diagram_handler),
        )
        .route("/studies/{id}/review", post(review_handler))
        .route("/reviews/due", get(due_reviews_handler));

    Router::new()
        .merge(library_routes)
        .merge(upload_routes)
        .merge(generation_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
