//! Gemini adapter tests against a local fake provider.
//!
//! Each test starts an axum server on an ephemeral port that plays the provider,
//! scripted per request, and records what the adapter sent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use api_lib::adapters::GeminiClient;
use neurostudy_core::ports::{ContentGenerationService, FileUploadService, GuideRequest, PortError};
use neurostudy_core::{RetryPolicy, SourceType, StudyGuide, StudyMode, StudySource};

//=========================================================================================
// Fake Provider
//=========================================================================================

/// What the adapter sent for one request.
#[derive(Clone, Debug)]
struct Recorded {
    path_and_query: String,
    headers: HeaderMap,
    body: Bytes,
}

type Script = Box<dyn Fn(usize, &Recorded) -> Response + Send + Sync>;

struct Provider {
    calls: AtomicUsize,
    recorded: Mutex<Vec<Recorded>>,
    script: Script,
}

async fn handle(State(provider): State<Arc<Provider>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let recorded = Recorded {
        path_and_query: uri.path_and_query().map(|p| p.to_string()).unwrap_or_default(),
        headers,
        body,
    };
    let n = provider.calls.fetch_add(1, Ordering::SeqCst);
    provider.recorded.lock().unwrap().push(recorded.clone());
    (provider.script)(n, &recorded)
}

async fn spawn_provider(
    script: impl Fn(usize, &Recorded) -> Response + Send + Sync + 'static,
) -> (String, Arc<Provider>) {
    let provider = Arc::new(Provider {
        calls: AtomicUsize::new(0),
        recorded: Mutex::new(Vec::new()),
        script: Box::new(script),
    });
    let app = Router::new().fallback(handle).with_state(provider.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), provider)
}

fn reply_text(text: &str) -> Response {
    axum::Json(json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    }))
    .into_response()
}

fn provider_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(json!({ "error": { "code": status.as_u16(), "message": message } })),
    )
        .into_response()
}

fn client(base_url: &str) -> GeminiClient {
    GeminiClient::new(Some("test-key".to_string()), "gemini-test", base_url)
        .with_retry_policy(RetryPolicy::default().with_initial_backoff(Duration::from_millis(10)))
}

fn guide() -> StudyGuide {
    StudyGuide {
        subject: "Cell Division".to_string(),
        overview: "Mitosis".to_string(),
        checkpoints: Vec::new(),
    }
}

const GUIDE_REPLY: &str = "```json\n{\"subject\":\"Cell Division\",\"overview\":\"Mitosis\",\"checkpoints\":[{\"mission\":\"Watch 0-5 min\",\"timestamp\":\"00:00\",\"lookFor\":\"Phases\",\"noteExactly\":\"PMAT\"}]}\n```";

//=========================================================================================
// Generation
//=========================================================================================

#[tokio::test]
async fn test_rate_limited_calls_are_retried() {
    let (base, provider) = spawn_provider(|n, _| match n {
        0 | 1 => provider_error(StatusCode::TOO_MANY_REQUESTS, "Resource exhausted"),
        _ => reply_text(GUIDE_REPLY),
    })
    .await;

    let request = GuideRequest {
        title: "Cell Division".to_string(),
        sources: vec![StudySource::text(SourceType::Text, "Notes", "Mitosis has four phases.")],
        mode: StudyMode::Survival,
        is_book: false,
    };
    let guide = client(&base).generate_study_guide(&request).await.unwrap();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(guide.subject, "Cell Division");
    assert_eq!(guide.checkpoints.len(), 1);
    assert_eq!(guide.checkpoints[0].note_exactly, "PMAT");
    assert!(!guide.checkpoints[0].completed);
    assert!(!guide.checkpoints[0].id.is_empty());

    let recorded = provider.recorded.lock().unwrap()[2].clone();
    assert_eq!(
        recorded.path_and_query,
        "/v1beta/models/gemini-test:generateContent?key=test-key"
    );
    let body: Value = serde_json::from_slice(&recorded.body).unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert!(parts[0]["text"]
        .as_str()
        .unwrap()
        .starts_with("--- SOURCE: Notes ---\nMitosis has four phases."));
    assert!(body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("SURVIVAL"));
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (base, provider) =
        spawn_provider(|_, _| provider_error(StatusCode::BAD_REQUEST, "API key not valid")).await;

    let err = client(&base).generate_slides(&guide()).await.unwrap_err();
    assert_eq!(
        err,
        PortError::Provider {
            status: 400,
            message: "API key not valid".to_string()
        }
    );
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_error() {
    let (base, provider) =
        spawn_provider(|_, _| provider_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded")).await;

    let err = client(&base).generate_flashcards(&guide()).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_malformed_replies_by_artifact() {
    let (base, _provider) = spawn_provider(|_, _| reply_text("Sorry, I cannot help with that.")).await;
    let client = client(&base);

    assert!(client.generate_slides(&guide()).await.unwrap().is_empty());
    assert!(client
        .generate_quiz(&guide(), StudyMode::Normal)
        .await
        .unwrap()
        .is_empty());
    assert!(client.generate_flashcards(&guide()).await.unwrap().is_empty());

    let request = GuideRequest {
        title: "x".to_string(),
        sources: vec![StudySource::text(SourceType::Text, "n", "c")],
        mode: StudyMode::Normal,
        is_book: false,
    };
    let err = client.generate_study_guide(&request).await.unwrap_err();
    assert!(matches!(err, PortError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_chat_sends_history_with_roles() {
    let (base, provider) = spawn_provider(|_, _| reply_text("  Anaphase separates chromatids.\n")).await;

    let history = vec![
        neurostudy_core::ChatMessage {
            role: neurostudy_core::ChatRole::User,
            text: "Hi".to_string(),
        },
        neurostudy_core::ChatMessage {
            role: neurostudy_core::ChatRole::Model,
            text: "Hello".to_string(),
        },
    ];
    let reply = client(&base)
        .chat(&guide(), &history, "What is anaphase?")
        .await
        .unwrap();
    assert_eq!(reply, "Anaphase separates chromatids.");

    let recorded = provider.recorded.lock().unwrap()[0].clone();
    let body: Value = serde_json::from_slice(&recorded.body).unwrap();
    let roles: Vec<&str> = body["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    assert_eq!(body["contents"][2]["parts"][0]["text"], "What is anaphase?");
}

#[tokio::test]
async fn test_diagram_fence_is_stripped() {
    let (base, _provider) =
        spawn_provider(|_, _| reply_text("```mermaid\ngraph TD\n  A-->B\n```")).await;
    let checkpoint = neurostudy_core::Checkpoint {
        id: "cp".to_string(),
        mission: "m".to_string(),
        timestamp: None,
        look_for: String::new(),
        note_exactly: String::new(),
        importance: None,
        question: None,
        diagram: None,
        completed: false,
    };
    let diagram = client(&base).generate_diagram(&checkpoint).await.unwrap();
    assert_eq!(diagram, "graph TD\n  A-->B");
}

//=========================================================================================
// Resumable Upload
//=========================================================================================

#[tokio::test]
async fn test_resumable_upload_protocol() {
    let upload_base = Arc::new(Mutex::new(String::new()));
    let session_url = upload_base.clone();
    let (base, provider) = spawn_provider(move |n, recorded| match n {
        0 => {
            assert_eq!(recorded.path_and_query, "/upload/v1beta/files?key=test-key");
            let url = format!("{}/upload-session/42", session_url.lock().unwrap());
            (StatusCode::OK, [("x-goog-upload-url", url)]).into_response()
        }
        _ => axum::Json(json!({
            "file": {
                "name": "files/abc",
                "uri": "https://generativelanguage.test/v1beta/files/abc",
                "mimeType": "video/mp4",
                "state": "ACTIVE"
            }
        }))
        .into_response(),
    })
    .await;
    *upload_base.lock().unwrap() = base.clone();

    let data = Bytes::from_static(b"fake video bytes");
    let uploaded = client(&base)
        .upload_file(data.clone(), "video/mp4", "lecture.mp4")
        .await
        .unwrap();
    assert_eq!(uploaded.uri, "https://generativelanguage.test/v1beta/files/abc");
    assert_eq!(uploaded.mime_type, "video/mp4");

    let recorded = provider.recorded.lock().unwrap().clone();
    assert_eq!(recorded.len(), 2);

    let start = &recorded[0];
    assert_eq!(start.headers["x-goog-upload-protocol"], "resumable");
    assert_eq!(start.headers["x-goog-upload-command"], "start");
    assert_eq!(
        start.headers["x-goog-upload-header-content-length"],
        data.len().to_string().as_str()
    );
    assert_eq!(start.headers["x-goog-upload-header-content-type"], "video/mp4");
    let start_body: Value = serde_json::from_slice(&start.body).unwrap();
    assert_eq!(start_body["file"]["display_name"], "lecture.mp4");

    let finalize = &recorded[1];
    assert_eq!(finalize.path_and_query, "/upload-session/42");
    assert_eq!(finalize.headers["x-goog-upload-command"], "upload, finalize");
    assert_eq!(finalize.headers["x-goog-upload-offset"], "0");
    assert_eq!(finalize.body, data);
}

#[tokio::test]
async fn test_missing_upload_url_is_invalid_response() {
    let (base, _provider) = spawn_provider(|_, _| StatusCode::OK.into_response()).await;
    let err = client(&base)
        .upload_file(Bytes::from_static(b"x"), "application/pdf", "a.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::InvalidResponse(_)));
}

fn remote_file(state: &str) -> Value {
    json!({
        "name": "files/abc",
        "uri": "https://generativelanguage.test/v1beta/files/abc",
        "mimeType": "video/mp4",
        "state": state
    })
}

/// Plays the upload start, then answers the finalize and each poll with `states` in order.
async fn spawn_processing_provider(states: Vec<&'static str>) -> (String, Arc<Provider>) {
    let upload_base = Arc::new(Mutex::new(String::new()));
    let session_url = upload_base.clone();
    let (base, provider) = spawn_provider(move |n, _| match n {
        0 => {
            let url = format!("{}/upload-session/7", session_url.lock().unwrap());
            (StatusCode::OK, [("x-goog-upload-url", url)]).into_response()
        }
        1 => axum::Json(json!({ "file": remote_file(states[0]) })).into_response(),
        n => {
            let state = states.get(n - 1).copied().unwrap_or("PROCESSING");
            axum::Json(remote_file(state)).into_response()
        }
    })
    .await;
    *upload_base.lock().unwrap() = base.clone();
    (base, provider)
}

#[tokio::test]
async fn test_processing_file_is_polled_until_active() {
    let (base, provider) = spawn_processing_provider(vec!["PROCESSING", "PROCESSING", "ACTIVE"]).await;

    let uploaded = client(&base)
        .with_file_polling(Duration::from_millis(10), 2)
        .upload_file(Bytes::from_static(b"video"), "video/mp4", "lecture.mp4")
        .await
        .unwrap();
    assert_eq!(uploaded.uri, "https://generativelanguage.test/v1beta/files/abc");

    let recorded = provider.recorded.lock().unwrap().clone();
    assert_eq!(recorded.len(), 4);
    for poll in &recorded[2..] {
        assert_eq!(poll.path_and_query, "/v1beta/files/abc?key=test-key");
    }
}

#[tokio::test]
async fn test_failed_processing_is_provider_error() {
    let (base, provider) = spawn_processing_provider(vec!["PROCESSING", "FAILED"]).await;

    let err = client(&base)
        .with_file_polling(Duration::from_millis(10), 5)
        .upload_file(Bytes::from_static(b"video"), "video/mp4", "lecture.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Provider { status: 422, .. }), "{:?}", err);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_processing_gives_up_after_last_poll() {
    let (base, provider) = spawn_processing_provider(vec!["PROCESSING"]).await;

    let err = client(&base)
        .with_file_polling(Duration::from_millis(10), 2)
        .upload_file(Bytes::from_static(b"video"), "video/mp4", "lecture.mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Unexpected(_)), "{:?}", err);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
}
