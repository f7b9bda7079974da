//! Pure state transition function

use super::{Effect, Event, Origin, TurnContext, TurnError, TurnState};
use crate::bus::TurnOutcome;
use crate::history::Turn;
use crate::llm::SendError;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Events the current state refuses
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("a round trip is already outstanding")]
    Busy,
    #[error("empty input")]
    EmptyInput,
    #[error("result for request {0} is stale")]
    Stale(String),
    #[error("pipeline disabled: {0}")]
    Disabled(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs and performs no
/// I/O.
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Submission
        // ============================================================
        (
            TurnState::Idle,
            Event::Submit {
                text,
                origin,
                request_id,
            },
        ) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyInput);
            }
            if let Some(reason) = &context.disabled_reason {
                return Err(TransitionError::Disabled(reason.clone()));
            }

            let user_turn = Turn::user(text);
            let mut result = TransitionResult::new(TurnState::AwaitingResponse {
                request_id: request_id.clone(),
                user_turn: user_turn.clone(),
            });
            if origin == Origin::User {
                result = result.with_effect(Effect::NotifyChatStarted);
            }
            Ok(result.with_effect(Effect::SendRequest {
                request_id,
                user_turn,
            }))
        }

        (TurnState::AwaitingResponse { .. }, Event::Submit { .. }) => Err(TransitionError::Busy),

        // ============================================================
        // Round-trip completion
        // ============================================================
        (
            TurnState::AwaitingResponse {
                request_id,
                user_turn,
            },
            Event::ResponseReceived {
                request_id: incoming,
                reply,
            },
        ) if *request_id == incoming => {
            let response = reply.response;
            Ok(TransitionResult::new(TurnState::Idle).with_effects([
                Effect::CommitExchange {
                    user_turn: user_turn.clone(),
                    model_turn: Turn::model(reply.json),
                },
                Effect::caption(response.reply.clone()),
                Effect::Dispatch {
                    response: response.clone(),
                },
                Effect::finished(TurnOutcome::Completed),
                Effect::Resolve {
                    request_id: incoming,
                    result: Ok(response),
                },
            ]))
        }

        (
            TurnState::AwaitingResponse { request_id, .. },
            Event::RequestFailed {
                request_id: incoming,
                error,
            },
        ) if *request_id == incoming => {
            // The pending user turn is dropped with the state
            let (caption, outcome) = match &error {
                SendError::Network(_) => (
                    context.network_failure_caption.clone(),
                    TurnOutcome::NetworkError,
                ),
                SendError::Parse { raw, .. } => (raw.clone(), TurnOutcome::ParseError),
            };
            Ok(TransitionResult::new(TurnState::Idle).with_effects([
                Effect::caption(caption),
                Effect::finished(outcome),
                Effect::resolve_err(incoming, TurnError::from(error)),
            ]))
        }

        (_, Event::ResponseReceived { request_id, .. } | Event::RequestFailed { request_id, .. }) => {
            Err(TransitionError::Stale(request_id))
        }

        // ============================================================
        // Reset
        // ============================================================
        (TurnState::Idle, Event::Reset) => Ok(TransitionResult::new(TurnState::Idle).with_effects([
            Effect::ClearHistory,
            Effect::ResetEmotion,
            Effect::caption(context.reset_caption.clone()),
        ])),

        (TurnState::AwaitingResponse { request_id, .. }, Event::Reset) => {
            Ok(TransitionResult::new(TurnState::Idle).with_effects([
                Effect::ClearHistory,
                Effect::ResetEmotion,
                Effect::caption(context.reset_caption.clone()),
                Effect::finished(TurnOutcome::Interrupted),
                Effect::resolve_err(request_id.clone(), TurnError::Interrupted),
            ]))
        }
    }
}
