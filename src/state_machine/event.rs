//! Events that drive the turn state machine

use crate::llm::{ParsedReply, SendError};

/// Who authored a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Typed or recognized speech; announces `ChatStarted`
    User,
    /// Narrative text sent on the user's behalf (touch reactions)
    StageDirection,
}

#[derive(Debug, Clone)]
pub enum Event {
    /// `request_id` is minted by the caller so the transition stays pure
    Submit {
        text: String,
        origin: Origin,
        request_id: String,
    },
    ResponseReceived {
        request_id: String,
        reply: ParsedReply,
    },
    RequestFailed {
        request_id: String,
        error: SendError,
    },
    Reset,
}
