//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for the Gemini generative content API.
//! It implements the `ContentGenerationService` and `FileUploadService` ports
//! from the `core` crate over plain HTTPS with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use neurostudy_core::generation::{self, SourcePart};
use neurostudy_core::ports::{
    ContentGenerationService, FileUploadService, GuideRequest, PortError, PortResult,
};
use neurostudy_core::{
    ChatMessage, ChatRole, Checkpoint, CheckpointPatch, Flashcard, QuizQuestion, RetryPolicy,
    SlideContent, StudyGuide, StudyMode, UploadedFile,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapters::prompts;

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const FILE_POLL_ATTEMPTS: u32 = 30;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }

    fn system(text: String) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

impl From<SourcePart> for Part {
    fn from(part: SourcePart) -> Self {
        match part {
            SourcePart::Text(text) => Part::text(text),
            SourcePart::Inline { mime_type, data } => Part {
                inline_data: Some(InlineData { mime_type, data }),
                ..Default::default()
            },
            SourcePart::File { mime_type, uri } => Part {
                file_data: Some(FileData {
                    mime_type,
                    file_uri: uri,
                }),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

impl GenerationConfig {
    fn json(schema: Value) -> Self {
        Self {
            response_mime_type: "application/json".to_string(),
            response_schema: Some(schema),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

#[derive(Debug, Serialize)]
struct StartUploadBody<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Debug, Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    #[serde(default)]
    name: Option<String>,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the generation and upload ports against Gemini.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    retry: RetryPolicy,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl GeminiClient {
    /// Creates a new `GeminiClient`. A missing key only fails when a call is made.
    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            poll_interval: FILE_POLL_INTERVAL,
            poll_attempts: FILE_POLL_ATTEMPTS,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides how often and how many times a processing file is polled.
    pub fn with_file_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    fn api_key(&self) -> PortResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| PortError::Configuration("GEMINI_API_KEY is not set".to_string()))
    }

    fn generate_endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Sends a generation request with the retry policy and returns the reply text.
    async fn generate(&self, request: &GenerateRequest) -> PortResult<String> {
        let api_key = self.api_key()?;
        self.retry
            .run(|| self.generate_once(api_key, request))
            .await
    }

    async fn generate_once(&self, api_key: &str, request: &GenerateRequest) -> PortResult<String> {
        let response = self
            .http
            .post(self.generate_endpoint())
            .query(&[("key", api_key)])
            .json(request)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to reach Gemini: {}", e)))?;

        let response = check_status(response).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PortError::InvalidResponse(e.to_string()))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PortError::InvalidResponse(
                "Gemini response contained no text content.".to_string(),
            ));
        }
        Ok(text)
    }

    fn structured(system: Option<String>, parts: Vec<Part>, schema: Value) -> GenerateRequest {
        GenerateRequest {
            system_instruction: system.map(Content::system),
            contents: vec![Content::user(parts)],
            generation_config: Some(GenerationConfig::json(schema)),
        }
    }

    //=====================================================================================
    // Resumable Upload Protocol
    //=====================================================================================

    async fn start_upload(
        &self,
        api_key: &str,
        size: usize,
        mime_type: &str,
        display_name: &str,
    ) -> PortResult<String> {
        let response = self
            .http
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .query(&[("key", api_key)])
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadBody {
                file: StartUploadFile { display_name },
            })
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to start upload: {}", e)))?;

        let response = check_status(response).await?;
        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PortError::InvalidResponse(format!("Upload start response lacked {}", UPLOAD_URL_HEADER))
            })
    }

    async fn finalize_upload(&self, upload_url: &str, data: Bytes) -> PortResult<RemoteFile> {
        let response = self
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(data)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to upload bytes: {}", e)))?;

        let response = check_status(response).await?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| PortError::InvalidResponse(e.to_string()))?;
        Ok(body.file)
    }

    /// Videos are processed asynchronously by the provider; wait until usable.
    async fn wait_until_active(&self, api_key: &str, mut file: RemoteFile) -> PortResult<RemoteFile> {
        let mut polls = 0;
        loop {
            match file.state.as_deref() {
                Some("PROCESSING") => {}
                Some("FAILED") => {
                    return Err(PortError::Provider {
                        status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                        message: format!("Provider failed to process {}", file.uri),
                    })
                }
                _ => return Ok(file),
            }
            let Some(name) = file.name.clone() else {
                return Ok(file);
            };
            if polls == self.poll_attempts {
                return Err(PortError::Unexpected(format!(
                    "File {} did not finish processing in time",
                    file.uri
                )));
            }
            polls += 1;
            debug!("File {} still processing, poll {} of {}", name, polls, self.poll_attempts);
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .http
                .get(format!("{}/v1beta/{}", self.base_url, name))
                .query(&[("key", api_key)])
                .send()
                .await
                .map_err(|e| PortError::Unexpected(format!("Failed to poll file: {}", e)))?;
            file = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| PortError::InvalidResponse(e.to_string()))?;
        }
    }
}

/// Maps a non-success response to `PortError::Provider`, keeping the provider's message.
async fn check_status(response: reqwest::Response) -> PortResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ProviderErrorBody>(&raw)
        .map(|b| b.error.message)
        .unwrap_or(raw);
    Err(PortError::Provider {
        status: status.as_u16(),
        message,
    })
}

//=========================================================================================
// `ContentGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentGenerationService for GeminiClient {
    async fn generate_study_guide(&self, request: &GuideRequest) -> PortResult<StudyGuide> {
        let mut parts: Vec<Part> = generation::merge_sources(&request.sources)
            .into_iter()
            .map(Part::from)
            .collect();
        if parts.is_empty() {
            return Err(PortError::InvalidInput(
                "Add at least one source before generating a guide".to_string(),
            ));
        }
        parts.push(Part::text(prompts::study_guide_request(&request.title)));

        info!(
            "Generating {:?} study guide for '{}' from {} sources",
            request.mode,
            request.title,
            request.sources.len()
        );
        let body = Self::structured(
            Some(prompts::study_guide_instructions(request.mode, request.is_book)),
            parts,
            prompts::study_guide_schema(),
        );
        let raw = self.generate(&body).await?;
        generation::parse_study_guide(&raw)
    }

    async fn generate_slides(&self, guide: &StudyGuide) -> PortResult<Vec<SlideContent>> {
        let body = Self::structured(
            None,
            vec![Part::text(prompts::slides_request(guide))],
            prompts::slides_schema(),
        );
        let raw = self.generate(&body).await?;
        Ok(generation::parse_or_empty(&raw, "slides"))
    }

    async fn generate_quiz(&self, guide: &StudyGuide, mode: StudyMode) -> PortResult<Vec<QuizQuestion>> {
        let body = Self::structured(
            None,
            vec![Part::text(prompts::quiz_request(guide, mode))],
            prompts::quiz_schema(),
        );
        let raw = self.generate(&body).await?;
        Ok(generation::parse_quiz(&raw))
    }

    async fn generate_flashcards(&self, guide: &StudyGuide) -> PortResult<Vec<Flashcard>> {
        let body = Self::structured(
            None,
            vec![Part::text(prompts::flashcards_request(guide))],
            prompts::flashcards_schema(),
        );
        let raw = self.generate(&body).await?;
        Ok(generation::parse_flashcards(&raw))
    }

    async fn chat(
        &self,
        guide: &StudyGuide,
        history: &[ChatMessage],
        message: &str,
    ) -> PortResult<String> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|m| Content {
                role: Some(
                    match m.role {
                        ChatRole::User => "user",
                        ChatRole::Model => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part::text(m.text.clone())],
            })
            .collect();
        contents.push(Content::user(vec![Part::text(message)]));

        let body = GenerateRequest {
            system_instruction: Some(Content::system(prompts::chat_instructions(guide))),
            contents,
            generation_config: None,
        };
        let reply = self.generate(&body).await?;
        Ok(reply.trim().to_string())
    }

    async fn refine_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        instruction: &str,
    ) -> PortResult<CheckpointPatch> {
        let body = Self::structured(
            None,
            vec![Part::text(prompts::refine_request(checkpoint, instruction))],
            prompts::refine_schema(),
        );
        let raw = self.generate(&body).await?;
        generation::parse_json(&raw)
    }

    async fn generate_diagram(&self, checkpoint: &Checkpoint) -> PortResult<String> {
        let body = GenerateRequest {
            system_instruction: None,
            contents: vec![Content::user(vec![Part::text(prompts::diagram_request(checkpoint))])],
            generation_config: None,
        };
        let raw = self.generate(&body).await?;
        generation::parse_diagram(&raw)
    }
}

//=========================================================================================
// `FileUploadService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FileUploadService for GeminiClient {
    async fn upload_file(
        &self,
        data: Bytes,
        mime_type: &str,
        display_name: &str,
    ) -> PortResult<UploadedFile> {
        let api_key = self.api_key()?;
        let size = data.len();
        info!("Uploading '{}' ({} bytes, {})", display_name, size, mime_type);

        let upload_url = self
            .retry
            .run(|| self.start_upload(api_key, size, mime_type, display_name))
            .await?;
        let file = self
            .retry
            .run(|| self.finalize_upload(&upload_url, data.clone()))
            .await?;
        let file = self.wait_until_active(api_key, file).await?;

        if file.mime_type.as_deref().is_some_and(|m| m != mime_type) {
            warn!(
                "Provider stored '{}' as {:?}, expected {}",
                display_name, file.mime_type, mime_type
            );
        }
        Ok(UploadedFile {
            uri: file.uri,
            mime_type: file.mime_type.unwrap_or_else(|| mime_type.to_string()),
        })
    }
}
