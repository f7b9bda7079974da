//! API request and response types

use crate::llm::Emotion;
use crate::runtime::Submission;
use crate::touch::BodyPart;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Request to touch the avatar
#[derive(Debug, Deserialize)]
pub struct TouchRequest {
    pub part: BodyPart,
}

/// Request to move the weather location
#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub city: String,
}

/// Result of a chat or touch submission
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChatResponse {
    Completed {
        emotion: Emotion,
        reply: String,
        spawn_object: Option<String>,
    },
    Ignored,
}

impl From<Submission> for ChatResponse {
    fn from(submission: Submission) -> Self {
        match submission {
            Submission::Completed(response) => ChatResponse::Completed {
                emotion: response.emotion,
                reply: response.reply,
                spawn_object: response.spawn_object,
            },
            Submission::Ignored => ChatResponse::Ignored,
        }
    }
}

/// Response for reset and location actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    /// Text to show in the caption area
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

impl ErrorResponse {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind,
            display_text: None,
        }
    }
}
