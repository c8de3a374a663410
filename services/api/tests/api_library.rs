//! Library and generation API tests.
//!
//! These run the full router against in-memory stores and a scripted provider,
//! so they need neither a database nor network access.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::TestContext;
use neurostudy_core::persistence::{REMOTE_STUDIES_ID, STUDIES_KEY};
use neurostudy_core::{AccessRole, LocalStore};

async fn create_folder(server: &axum_test::TestServer, name: &str, parent: Option<&str>) -> String {
    let response = server
        .post("/folders")
        .json(&json!({ "name": name, "parentId": parent }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

async fn create_study(server: &axum_test::TestServer, title: &str, folder: Option<&str>) -> String {
    let response = server
        .post("/studies")
        .json(&json!({ "title": title, "folderId": folder, "mode": "pareto" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_str().unwrap().to_string()
}

/// Folder, study, source, guide, checkpoint: the core study workflow end to end.
#[tokio::test]
async fn test_biology_study_workflow() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let biology = create_folder(&server, "Biology", None).await;
    let study_id = create_study(&server, "Cell Division", Some(&biology)).await;

    server
        .post(&format!("/studies/{}/sources", study_id))
        .json(&json!({ "type": "text", "name": "Lecture notes", "content": "Mitosis has four phases." }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post(&format!("/studies/{}/generate/guide", study_id))
        .await;
    response.assert_status_ok();
    let study: Value = response.json();
    assert_eq!(study["folderId"], biology.as_str());
    assert_eq!(study["mode"], "pareto");
    assert_eq!(study["guide"]["subject"], "Cell Division");
    assert_eq!(study["guide"]["checkpoints"].as_array().unwrap().len(), 2);

    let request = ctx.generator.last_guide_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.sources.len(), 1);
    assert_eq!(request.sources[0].content, "Mitosis has four phases.");

    let response = server
        .post(&format!("/studies/{}/checkpoints/cp-1/toggle", study_id))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["completed"], true);

    let library: Value = server.get("/library").await.json();
    let studies = library["studies"].as_array().unwrap();
    assert_eq!(studies.len(), 1);
    assert_eq!(studies[0]["guide"]["checkpoints"][0]["completed"], true);
    assert_eq!(studies[0]["guide"]["checkpoints"][1]["completed"], false);

    // Privileged saves reach the remote table as well.
    let rows = ctx.remote.rows();
    let studies_row = rows.iter().find(|r| r.id == REMOTE_STUDIES_ID).unwrap();
    assert!(studies_row.content.contains("Cell Division"));
}

#[tokio::test]
async fn test_deleting_folder_cascades_to_subtree() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let science = create_folder(&server, "Science", None).await;
    let chemistry = create_folder(&server, "Chemistry", Some(&science)).await;
    let history = create_folder(&server, "History", None).await;
    let bonds = create_study(&server, "Covalent Bonds", Some(&chemistry)).await;
    let rome = create_study(&server, "Rome", Some(&history)).await;

    server
        .put("/active-study")
        .json(&json!({ "studyId": bonds }))
        .await
        .assert_status_ok();

    let response = server.delete(&format!("/folders/{}", science)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["deletedStudyIds"], json!([bonds]));
    assert_eq!(body["deletedFolderIds"].as_array().unwrap().len(), 2);

    let library: Value = server.get("/library").await.json();
    assert_eq!(library["activeStudyId"], Value::Null);
    assert_eq!(library["folders"].as_array().unwrap().len(), 1);
    assert_eq!(library["studies"][0]["id"], rome.as_str());
}

#[tokio::test]
async fn test_folder_cannot_move_into_its_own_subtree() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let outer = create_folder(&server, "Outer", None).await;
    let inner = create_folder(&server, "Inner", Some(&outer)).await;

    let response = server
        .patch(&format!("/folders/{}", outer))
        .json(&json!({ "parentId": inner }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "invalid_input");

    let response = server
        .patch(&format!("/folders/{}", inner))
        .json(&json!({ "name": "Top", "parentId": "root" }))
        .await;
    response.assert_status_ok();
    let folder: Value = response.json();
    assert_eq!(folder["name"], "Top");
    assert_eq!(folder["parentId"], "root");
}

/// A combined edit that fails part-way leaves memory and the stores as they were.
#[tokio::test]
async fn test_rejected_combined_patch_changes_nothing() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let outer = create_folder(&server, "Outer", None).await;
    let inner = create_folder(&server, "Inner", Some(&outer)).await;
    let study_id = create_study(&server, "Optics", Some(&outer)).await;
    let stored_before = ctx.local.get_item(STUDIES_KEY).await.unwrap();

    server
        .patch(&format!("/folders/{}", outer))
        .json(&json!({ "name": "Renamed", "parentId": inner }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .patch(&format!("/studies/{}", study_id))
        .json(&json!({ "title": "Lenses", "folderId": "missing" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let library: Value = server.get("/library").await.json();
    let outer_folder = library["folders"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["id"] == outer.as_str())
        .unwrap()
        .clone();
    assert_eq!(outer_folder["name"], "Outer");
    assert_eq!(library["studies"][0]["title"], "Optics");
    assert_eq!(library["studies"][0]["folderId"], outer.as_str());
    assert_eq!(ctx.local.get_item(STUDIES_KEY).await.unwrap(), stored_before);
}

#[tokio::test]
async fn test_unknown_study_is_not_found() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let response = server.post("/studies/missing/generate/guide").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "not_found");

    server
        .delete("/studies/missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generation_preconditions() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let study_id = create_study(&server, "Empty", None).await;

    server
        .post(&format!("/studies/{}/generate/guide", study_id))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post(&format!("/studies/{}/generate/slides", study_id))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.generator.guide_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_derived_artifacts_chat_and_checkpoint_tools() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let study_id = create_study(&server, "Cell Division", None).await;
    server
        .post(&format!("/studies/{}/sources", study_id))
        .json(&json!({ "type": "link", "name": "Khan Academy", "content": "https://example.org/mitosis" }))
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post(&format!("/studies/{}/generate/guide", study_id))
        .await
        .assert_status_ok();

    for artifact in ["slides", "quiz", "flashcards"] {
        server
            .post(&format!("/studies/{}/generate/{}", study_id, artifact))
            .await
            .assert_status_ok();
    }
    let library: Value = server.get("/library").await.json();
    let study = &library["studies"][0];
    assert_eq!(study["slides"].as_array().unwrap().len(), 1);
    assert_eq!(study["quiz"].as_array().unwrap().len(), 2);
    assert_eq!(study["flashcards"].as_array().unwrap().len(), 1);

    let reply: Value = server
        .post(&format!("/studies/{}/chat", study_id))
        .json(&json!({
            "history": [{ "role": "user", "text": "hi" }, { "role": "model", "text": "hello" }],
            "message": "What is anaphase?"
        }))
        .await
        .json();
    assert_eq!(reply["reply"], "[Cell Division|2 prior] What is anaphase?");

    let refined: Value = server
        .post(&format!("/studies/{}/checkpoints/cp-2/refine", study_id))
        .json(&json!({ "instruction": "simpler" }))
        .await
        .json();
    assert_eq!(refined["mission"], "Refined: simpler");
    assert_eq!(refined["noteExactly"], "PMAT");

    let diagram: Value = server
        .post(&format!("/studies/{}/checkpoints/cp-2/diagram", study_id))
        .await
        .json();
    assert_eq!(diagram["diagram"], "graph TD; A-->B");

    let library: Value = server.get("/library").await.json();
    assert_eq!(
        library["studies"][0]["guide"]["checkpoints"][1]["diagram"],
        "graph TD; A-->B"
    );
}

#[tokio::test]
async fn test_file_sources_upload_or_inline_by_size() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let study_id = create_study(&server, "Lectures", None).await;

    let video = MultipartForm::new().add_text("name", "Lecture 1").add_part(
        "file",
        Part::bytes(vec![0u8; 8]).file_name("lecture.mp4").mime_type("video/mp4"),
    );
    let response = server
        .post(&format!("/studies/{}/sources/file", study_id))
        .multipart(video)
        .await;
    response.assert_status(StatusCode::CREATED);
    let source: Value = response.json();
    assert_eq!(source["type"], "video");
    assert_eq!(source["name"], "Lecture 1");
    assert_eq!(source["fileUri"], "https://files.test/1");
    assert_eq!(source["content"], "");

    let image = MultipartForm::new().add_part(
        "file",
        Part::bytes(vec![1u8, 2, 3]).file_name("cell.png").mime_type("image/png"),
    );
    let response = server
        .post(&format!("/studies/{}/sources/file", study_id))
        .multipart(image)
        .await;
    response.assert_status(StatusCode::CREATED);
    let source: Value = response.json();
    assert_eq!(source["type"], "image");
    assert_eq!(source["name"], "cell.png");
    assert_eq!(source["content"], "AQID");
    assert!(source.get("fileUri").is_none());

    let uploads = ctx.uploader.uploads.lock().unwrap().clone();
    assert_eq!(uploads, vec![("Lecture 1".to_string(), "video/mp4".to_string(), 8)]);
}

#[tokio::test]
async fn test_binary_json_source_must_be_base64() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let study_id = create_study(&server, "Scans", None).await;

    server
        .post(&format!("/studies/{}/sources", study_id))
        .json(&json!({ "type": "pdf", "name": "scan.pdf", "content": "not base64!" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post(&format!("/studies/{}/sources", study_id))
        .json(&json!({ "type": "pdf", "name": "scan.pdf", "content": "JVBERi0=" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["mimeType"], "application/pdf");
}

#[tokio::test]
async fn test_review_schedules_next_date() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let study_id = create_study(&server, "Spaced", None).await;

    let study: Value = server
        .post(&format!("/studies/{}/review", study_id))
        .await
        .json();
    assert_eq!(study["reviewStep"], 0);
    assert!(study["nextReviewDate"].as_i64().unwrap() > study["updatedAt"].as_i64().unwrap());

    let due: Value = server.get("/reviews/due").await.json();
    assert_eq!(due, json!([]));
}

#[tokio::test]
async fn test_tutorial_preference() {
    let ctx = TestContext::new().await;
    let server = ctx.server();

    let pref: Value = server.get("/preferences/tutorial").await.json();
    assert_eq!(pref["dismissed"], false);

    server
        .put("/preferences/tutorial")
        .json(&json!({ "dismissed": false }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .put("/preferences/tutorial")
        .json(&json!({ "dismissed": true }))
        .await
        .assert_status_ok();

    let pref: Value = server.get("/preferences/tutorial").await.json();
    assert_eq!(pref["dismissed"], true);
}

/// A restart over the same stores restores exactly what was saved.
#[tokio::test]
async fn test_library_survives_restart() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let folder = create_folder(&server, "Physics", None).await;
    create_study(&server, "Optics", Some(&folder)).await;
    let before: Value = server.get("/library").await.json();

    let restarted =
        TestContext::with_stores(ctx.local.clone(), ctx.remote.clone(), AccessRole::Privileged).await;
    let after: Value = restarted.server().get("/library").await.json();
    assert_eq!(after["studies"], before["studies"]);
    assert_eq!(after["folders"], before["folders"]);
}

#[tokio::test]
async fn test_standard_role_stays_local() {
    let ctx = TestContext::with_stores(
        Arc::new(Default::default()),
        Arc::new(Default::default()),
        AccessRole::Standard,
    )
    .await;
    let server = ctx.server();
    create_study(&server, "Offline", None).await;

    assert!(ctx.remote.rows().is_empty());
    assert!(ctx.local.get_item(STUDIES_KEY).await.unwrap().unwrap().contains("Offline"));

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["remote_sync"], false);

    let reloaded: Value = server.post("/library/reload").await.json();
    assert_eq!(reloaded["studies"][0]["title"], "Offline");
}
