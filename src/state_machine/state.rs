//! Turn state types

use crate::history::Turn;
use serde::Serialize;

/// Round-trip state of the conversation
///
/// `AwaitingResponse` owns the pending user turn; it only reaches the history
/// together with the model turn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingResponse {
        request_id: String,
        user_turn: Turn,
    },
}

impl TurnState {
    pub fn is_busy(&self) -> bool {
        matches!(self, TurnState::AwaitingResponse { .. })
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            TurnState::Idle => None,
            TurnState::AwaitingResponse { request_id, .. } => Some(request_id),
        }
    }
}

/// Immutable configuration visible to transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    pub model_id: String,
    /// Set when credentials are missing; every submission is refused
    pub disabled_reason: Option<String>,
    /// Caption shown after a transport failure
    pub network_failure_caption: String,
    /// Caption shown after a reset
    pub reset_caption: String,
}

pub const DEFAULT_NETWORK_FAILURE_CAPTION: &str =
    "Sorry, I couldn't reach the server. Please try again.";
pub const DEFAULT_RESET_CAPTION: &str = "Conversation reset.";

impl TurnContext {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            disabled_reason: None,
            network_failure_caption: DEFAULT_NETWORK_FAILURE_CAPTION.to_string(),
            reset_caption: DEFAULT_RESET_CAPTION.to_string(),
        }
    }

    pub fn disabled(model_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            disabled_reason: Some(reason.into()),
            ..Self::new(model_id)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.disabled_reason.is_none()
    }
}
