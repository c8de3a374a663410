//! crates/neurostudy_core/src/generation.rs
//!
//! Provider-independent helpers for the generation client: turning a study's
//! sources into request parts and turning the model's JSON replies back into
//! domain records.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::domain::{new_id, Checkpoint, Flashcard, QuizQuestion, SourceType, StudyGuide, StudySource};
use crate::ports::{PortError, PortResult};

//=========================================================================================
// Request Parts
//=========================================================================================

/// One piece of the content sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePart {
    Text(String),
    /// Base64-encoded bytes sent inside the request.
    Inline { mime_type: String, data: String },
    /// A file previously stored with the provider.
    File { mime_type: String, uri: String },
}

/// The MIME type assumed for a binary source that does not name one.
pub fn default_mime(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::Pdf => "application/pdf",
        SourceType::Video => "video/mp4",
        SourceType::Image => "image/png",
        SourceType::Audio => "audio/mpeg",
        SourceType::Text | SourceType::Link => "text/plain",
    }
}

/// Decides whether a binary source goes through the provider's resumable upload
/// instead of being stored inline as base64. Videos always do.
pub fn should_upload(source_type: SourceType, size: usize, inline_limit: usize) -> bool {
    match source_type {
        SourceType::Video => true,
        t if t.is_binary() => size > inline_limit,
        _ => false,
    }
}

/// Merges a study's sources into request parts.
///
/// All textual sources are concatenated into a single leading text part, each
/// under a header naming it. Binary sources follow in their original order.
pub fn merge_sources(sources: &[StudySource]) -> Vec<SourcePart> {
    let mut text = String::new();
    let mut binaries = Vec::new();

    for source in sources {
        if source.source_type.is_binary() {
            let mime_type = source
                .mime_type
                .clone()
                .unwrap_or_else(|| default_mime(source.source_type).to_string());
            match &source.file_uri {
                Some(uri) => binaries.push(SourcePart::File {
                    mime_type,
                    uri: uri.clone(),
                }),
                None if !source.content.is_empty() => binaries.push(SourcePart::Inline {
                    mime_type,
                    data: source.content.clone(),
                }),
                None => warn!("Source '{}' has neither content nor a file reference, skipping", source.name),
            }
            continue;
        }

        if !text.is_empty() {
            text.push_str("\n\n");
        }
        let label = match source.source_type {
            SourceType::Link => "LINK",
            _ => "SOURCE",
        };
        text.push_str(&format!("--- {}: {} ---\n{}", label, source.name, source.content.trim()));
    }

    let mut parts = Vec::with_capacity(binaries.len() + 1);
    if !text.is_empty() {
        parts.push(SourcePart::Text(text));
    }
    parts.extend(binaries);
    parts
}

//=========================================================================================
// Response Parsing
//=========================================================================================

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$").expect("valid fence regex")
});

/// Removes a surrounding markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Strips fences and parses the payload as JSON.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> PortResult<T> {
    serde_json::from_str(strip_code_fences(raw)).map_err(|e| PortError::InvalidResponse(e.to_string()))
}

/// Parses a collection, logging and returning an empty one on failure.
pub fn parse_or_empty<T: DeserializeOwned>(raw: &str, step: &str) -> Vec<T> {
    match parse_json(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!("Discarding unparseable {} response: {}", step, e);
            Vec::new()
        }
    }
}

/// Parses a JSON array item by item, dropping items that do not match `T`.
pub fn parse_each<T: DeserializeOwned>(raw: &str, step: &str) -> Vec<T> {
    parse_or_empty::<serde_json::Value>(raw, step)
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Dropping malformed {} item: {}", step, e);
                None
            }
        })
        .collect()
}

/// A checkpoint as the model writes it: no id, no completion flag.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedCheckpoint {
    mission: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    look_for: String,
    #[serde(default)]
    note_exactly: String,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedGuide {
    subject: String,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    checkpoints: Vec<GeneratedCheckpoint>,
}

/// Parses a study guide, giving every checkpoint a fresh id and `completed = false`.
pub fn parse_study_guide(raw: &str) -> PortResult<StudyGuide> {
    let generated: GeneratedGuide = parse_json(raw)?;
    Ok(StudyGuide {
        subject: generated.subject,
        overview: generated.overview,
        checkpoints: generated
            .checkpoints
            .into_iter()
            .map(|c| Checkpoint {
                id: new_id(),
                mission: c.mission,
                timestamp: c.timestamp.filter(|t| !t.trim().is_empty()),
                look_for: c.look_for,
                note_exactly: c.note_exactly,
                importance: c.importance,
                question: c.question,
                diagram: None,
                completed: false,
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedQuestion {
    question: String,
    options: Vec<String>,
    correct_index: usize,
    #[serde(default)]
    explanation: String,
}

/// Parses a quiz, dropping malformed questions and those whose answer index is out of range.
pub fn parse_quiz(raw: &str) -> Vec<QuizQuestion> {
    parse_each::<GeneratedQuestion>(raw, "quiz")
        .into_iter()
        .filter(|q| q.correct_index < q.options.len())
        .map(|q| QuizQuestion {
            id: new_id(),
            question: q.question,
            options: q.options,
            correct_index: q.correct_index,
            explanation: q.explanation,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct GeneratedFlashcard {
    front: String,
    back: String,
}

pub fn parse_flashcards(raw: &str) -> Vec<Flashcard> {
    parse_each::<GeneratedFlashcard>(raw, "flashcards")
        .into_iter()
        .map(|f| Flashcard {
            id: new_id(),
            front: f.front,
            back: f.back,
        })
        .collect()
}

/// Extracts diagram source from a reply that may wrap it in a ```` ```mermaid ```` fence.
pub fn parse_diagram(raw: &str) -> PortResult<String> {
    let diagram = strip_code_fences(raw).trim();
    if diagram.is_empty() {
        return Err(PortError::InvalidResponse("empty diagram".to_string()));
    }
    Ok(diagram.to_string())
}
