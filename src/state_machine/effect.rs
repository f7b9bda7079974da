//! Effects produced by state transitions

use crate::bus::TurnOutcome;
use crate::history::Turn;
use crate::llm::{LlmError, SendError, StructuredOutputError, StructuredResponse};
use thiserror::Error;

/// Why a submitted turn did not complete
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("generative service is not configured: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(LlmError),
    #[error("could not parse model reply: {reason}")]
    Parse {
        raw: String,
        reason: StructuredOutputError,
    },
    #[error("turn interrupted by a conversation reset")]
    Interrupted,
    #[error("turn runtime has stopped")]
    Shutdown,
}

impl From<SendError> for TurnError {
    fn from(error: SendError) -> Self {
        match error {
            SendError::Network(e) => TurnError::Network(e),
            SendError::Parse { raw, source } => TurnError::Parse {
                raw,
                reason: source,
            },
        }
    }
}

/// Effects to be executed by the runtime after a transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Publish `ChatStarted`
    NotifyChatStarted,

    /// Build the instruction and request window, then call the service in the
    /// background
    SendRequest { request_id: String, user_turn: Turn },

    /// Append both turns to the history and persist
    CommitExchange { user_turn: Turn, model_turn: Turn },

    /// Fan out emotion / prop / speech
    Dispatch { response: StructuredResponse },

    ShowCaption { text: String },

    /// Empty the history and delete the file
    ClearHistory,

    ResetEmotion,

    NotifyTurnFinished { outcome: TurnOutcome },

    /// Answer the caller waiting on `request_id`
    Resolve {
        request_id: String,
        result: Result<StructuredResponse, TurnError>,
    },
}

impl Effect {
    pub fn caption(text: impl Into<String>) -> Self {
        Effect::ShowCaption { text: text.into() }
    }

    pub fn finished(outcome: TurnOutcome) -> Self {
        Effect::NotifyTurnFinished { outcome }
    }

    pub fn resolve_err(request_id: impl Into<String>, error: TurnError) -> Self {
        Effect::Resolve {
            request_id: request_id.into(),
            result: Err(error),
        }
    }
}
