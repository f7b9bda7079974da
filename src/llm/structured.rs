//! Structured output embedded in free-text model replies
//!
//! The model is asked to answer with a JSON object
//! `{"emotion": ..., "reply": ..., "spawnObject": ...}` but routinely wraps it
//! in prose or code fences. Extraction finds the first balanced `{...}`
//! substring that parses as a JSON object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The fixed set of facial emotions the avatar can display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Surprise,
    Confusion,
    Shame,
    #[default]
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Surprise,
        Emotion::Confusion,
        Emotion::Shame,
        Emotion::Neutral,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Surprise => "surprise",
            Emotion::Confusion => "confusion",
            Emotion::Shame => "shame",
            Emotion::Neutral => "neutral",
        }
    }

    /// Match a label case-insensitively, ignoring surrounding whitespace
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|e| e.label() == cleaned)
    }

    /// Like [`Emotion::from_label`], but unknown labels fall back to neutral
    pub fn resolve(label: &str) -> Self {
        Self::from_label(label).unwrap_or_else(|| {
            tracing::warn!(label = %label, "Unknown emotion label, using neutral");
            Emotion::Neutral
        })
    }

    pub fn is_default(self) -> bool {
        self == Emotion::Neutral
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A successfully parsed model reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredResponse {
    pub emotion: Emotion,
    pub reply: String,
    pub spawn_object: Option<String>,
}

/// Parsed reply plus the JSON text it came from (committed as the model turn)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub response: StructuredResponse,
    pub json: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructuredOutputError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("model output is not a valid JSON object: {0}")]
    InvalidJson(String),
    #[error("model output is missing the required \"reply\" field")]
    MissingReply,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    emotion: Option<Value>,
    #[serde(default)]
    reply: Option<Value>,
    #[serde(default, rename = "spawnObject", alias = "spawn_object")]
    spawn_object: Option<Value>,
}

/// Return the first balanced `{...}` substring, if any.
///
/// Braces inside JSON string literals are ignored while scanning.
pub fn extract_json_object(text: &str) -> Option<&str> {
    balanced_objects(text).next()
}

/// All balanced `{...}` substrings, in order of their opening brace.
///
/// One pass with a stack of open braces. Quotes only open a string literal
/// inside a candidate, so prose between objects never hides the next one.
fn balanced_objects(text: &str) -> impl Iterator<Item = &str> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
        .into_iter()
        .filter_map(move |(start, end)| text.get(start..=end))
}

/// Extract and parse the structured reply from raw model text.
pub fn parse_structured_reply(raw: &str) -> Result<ParsedReply, StructuredOutputError> {
    let mut last_error = None;

    for candidate in balanced_objects(raw) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value @ Value::Object(_)) => {
                return interpret(value).map(|response| ParsedReply {
                    response,
                    json: candidate.to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(last_error.map_or(
        StructuredOutputError::NoJsonObject,
        StructuredOutputError::InvalidJson,
    ))
}

fn interpret(value: Value) -> Result<StructuredResponse, StructuredOutputError> {
    let raw: RawReply = serde_json::from_value(value)
        .map_err(|e| StructuredOutputError::InvalidJson(e.to_string()))?;

    let reply = match raw.reply {
        Some(Value::String(reply)) => reply,
        _ => return Err(StructuredOutputError::MissingReply),
    };

    let emotion = match raw.emotion {
        Some(Value::String(label)) => Emotion::resolve(&label),
        Some(other) => {
            tracing::warn!(emotion = %other, "Non-string emotion, using neutral");
            Emotion::Neutral
        }
        None => Emotion::Neutral,
    };

    let spawn_object = raw
        .spawn_object
        .as_ref()
        .and_then(Value::as_str)
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty());

    Ok(StructuredResponse {
        emotion,
        reply,
        spawn_object,
    })
}
