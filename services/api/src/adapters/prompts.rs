//! services/api/src/adapters/prompts.rs
//!
//! Instruction text and response schemas for the Gemini adapter. Schemas use
//! the provider's OpenAPI subset (upper-case type names).

use neurostudy_core::{Checkpoint, StudyGuide, StudyMode};
use serde_json::{json, Value};

const GUIDE_INSTRUCTIONS: &str = r#"You are a study coach turning source material into an active study guide.
Break the material into checkpoints. Each checkpoint is one small task: watch or read a segment,
what to look for while doing it, and the exact fact to write down.
For video or audio sources, give the segment start as "mm:ss" in `timestamp`.
Write every field in the language of the source material."#;

fn mode_instructions(mode: StudyMode) -> &'static str {
    match mode {
        StudyMode::Survival => {
            "SURVIVAL MODE: the learner has very little time. Produce at most 5 checkpoints covering only what is needed to pass."
        }
        StudyMode::Normal => {
            "NORMAL MODE: cover every major idea with 8 to 15 checkpoints of moderate depth."
        }
        StudyMode::Hard => {
            "HARD MODE: cover the material exhaustively, including edge cases and derivations. Add a recall `question` to every checkpoint."
        }
        StudyMode::Pareto => {
            "PARETO MODE: find the 20% of the content that yields 80% of the understanding and build checkpoints only for that."
        }
    }
}

/// The system instruction for study guide generation.
pub fn study_guide_instructions(mode: StudyMode, is_book: bool) -> String {
    let mut prompt = format!("{}\n\n{}", GUIDE_INSTRUCTIONS, mode_instructions(mode));
    if is_book {
        prompt.push_str(
            "\n\nThe subject is a whole book. Organise checkpoints by chapter and name the chapter in each mission.",
        );
    }
    prompt
}

pub fn study_guide_request(title: &str) -> String {
    format!(
        "Create the study guide for \"{}\" from the sources provided. Respond with JSON only.",
        title
    )
}

pub fn study_guide_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "subject": { "type": "STRING" },
            "overview": { "type": "STRING" },
            "checkpoints": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "mission": { "type": "STRING" },
                        "timestamp": { "type": "STRING" },
                        "lookFor": { "type": "STRING" },
                        "noteExactly": { "type": "STRING" },
                        "importance": { "type": "STRING" },
                        "question": { "type": "STRING" }
                    },
                    "required": ["mission", "lookFor", "noteExactly"]
                }
            }
        },
        "required": ["subject", "overview", "checkpoints"]
    })
}

/// Renders a guide as plain text context for follow-up steps.
pub fn guide_context(guide: &StudyGuide) -> String {
    let mut context = format!("SUBJECT: {}\nOVERVIEW: {}\n", guide.subject, guide.overview);
    for (i, checkpoint) in guide.checkpoints.iter().enumerate() {
        context.push_str(&format!(
            "\n{}. {}\n   Look for: {}\n   Note: {}",
            i + 1,
            checkpoint.mission,
            checkpoint.look_for,
            checkpoint.note_exactly
        ));
    }
    context
}

pub fn slides_request(guide: &StudyGuide) -> String {
    format!(
        "Turn this study guide into a slide deck. One slide per key idea, 3 to 5 short bullets each.\n\n{}",
        guide_context(guide)
    )
}

pub fn slides_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "bullets": { "type": "ARRAY", "items": { "type": "STRING" } },
                "speakerNotes": { "type": "STRING" }
            },
            "required": ["title", "bullets"]
        }
    })
}

pub fn quiz_request(guide: &StudyGuide, mode: StudyMode) -> String {
    let count = match mode {
        StudyMode::Survival => 5,
        StudyMode::Pareto => 8,
        StudyMode::Normal => 10,
        StudyMode::Hard => 15,
    };
    format!(
        "Write {} multiple-choice questions testing this study guide. Four options each, `correctIndex` is zero-based.\n\n{}",
        count,
        guide_context(guide)
    )
}

pub fn quiz_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "question": { "type": "STRING" },
                "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                "correctIndex": { "type": "INTEGER" },
                "explanation": { "type": "STRING" }
            },
            "required": ["question", "options", "correctIndex"]
        }
    })
}

pub fn flashcards_request(guide: &StudyGuide) -> String {
    format!(
        "Write flashcards for active recall of this study guide. Keep the front a short prompt and the back a precise answer.\n\n{}",
        guide_context(guide)
    )
}

pub fn flashcards_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "front": { "type": "STRING" },
                "back": { "type": "STRING" }
            },
            "required": ["front", "back"]
        }
    })
}

pub fn chat_instructions(guide: &StudyGuide) -> String {
    format!(
        "You are a tutor answering questions about the learner's study guide. Be concise and concrete.\n\n{}",
        guide_context(guide)
    )
}

fn checkpoint_context(checkpoint: &Checkpoint) -> String {
    format!(
        "MISSION: {}\nLOOK FOR: {}\nNOTE EXACTLY: {}",
        checkpoint.mission, checkpoint.look_for, checkpoint.note_exactly
    )
}

pub fn refine_request(checkpoint: &Checkpoint, instruction: &str) -> String {
    format!(
        "Rewrite this study checkpoint following the instruction. Return only the fields you changed.\n\nINSTRUCTION: {}\n\n{}",
        instruction,
        checkpoint_context(checkpoint)
    )
}

pub fn refine_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "mission": { "type": "STRING" },
            "lookFor": { "type": "STRING" },
            "noteExactly": { "type": "STRING" },
            "importance": { "type": "STRING" },
            "question": { "type": "STRING" }
        }
    })
}

pub fn diagram_request(checkpoint: &Checkpoint) -> String {
    format!(
        "Draw a Mermaid diagram that explains this checkpoint. Reply with the Mermaid source only.\n\n{}",
        checkpoint_context(checkpoint)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_mode_adds_chapter_guidance() {
        let plain = study_guide_instructions(StudyMode::Pareto, false);
        let book = study_guide_instructions(StudyMode::Pareto, true);
        assert!(plain.contains("PARETO"));
        assert!(!plain.contains("chapter"));
        assert!(book.contains("chapter"));
    }

    #[test]
    fn guide_schema_requires_checkpoints() {
        let schema = study_guide_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|r| r == "checkpoints"));
    }
}
