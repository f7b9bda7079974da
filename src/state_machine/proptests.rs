//! Property-based tests for the turn state machine
//!
//! Random interleavings of submissions, late or stale results and resets
//! must never produce two outstanding requests or a commit for the wrong turn.

use super::transition::*;
use super::*;
use crate::history::Turn;
use crate::llm::{parse_structured_reply, LlmError, SendError, StructuredOutputError};
use proptest::prelude::*;

fn test_context() -> TurnContext {
    TurnContext::new("test-model")
}

/// Abstract step; request ids are resolved against the live state when applied
#[derive(Debug, Clone)]
enum Step {
    Submit { text: String, user: bool },
    Succeed { stale: bool },
    FailNetwork { stale: bool },
    FailParse { stale: bool },
    Reset,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => ("[a-z ]{0,12}", any::<bool>()).prop_map(|(text, user)| Step::Submit { text, user }),
        3 => any::<bool>().prop_map(|stale| Step::Succeed { stale }),
        1 => any::<bool>().prop_map(|stale| Step::FailNetwork { stale }),
        1 => any::<bool>().prop_map(|stale| Step::FailParse { stale }),
        1 => Just(Step::Reset),
    ]
}

fn target_id(state: &TurnState, stale: bool, counter: usize) -> String {
    match (state.request_id(), stale) {
        (Some(id), false) => id.to_string(),
        _ => format!("stale-{counter}"),
    }
}

fn to_event(step: &Step, state: &TurnState, counter: usize) -> Event {
    match step {
        Step::Submit { text, user } => Event::Submit {
            text: text.clone(),
            origin: if *user { Origin::User } else { Origin::StageDirection },
            request_id: format!("req-{counter}"),
        },
        Step::Succeed { stale } => Event::ResponseReceived {
            request_id: target_id(state, *stale, counter),
            reply: parse_structured_reply(r#"{"emotion":"joy","reply":"ok"}"#).unwrap(),
        },
        Step::FailNetwork { stale } => Event::RequestFailed {
            request_id: target_id(state, *stale, counter),
            error: SendError::Network(LlmError::network("down")),
        },
        Step::FailParse { stale } => Event::RequestFailed {
            request_id: target_id(state, *stale, counter),
            error: SendError::Parse {
                raw: "prose".to_string(),
                source: StructuredOutputError::NoJsonObject,
            },
        },
        Step::Reset => Event::Reset,
    }
}

proptest! {
    #[test]
    fn prop_single_flight_and_atomic_commit(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let context = test_context();
        let mut state = TurnState::Idle;
        let mut outstanding: Option<(String, Turn)> = None;

        for (counter, step) in steps.iter().enumerate() {
            let event = to_event(step, &state, counter);
            let was_busy = state.is_busy();

            match transition(&state, &context, event) {
                Ok(result) => {
                    for effect in &result.effects {
                        match effect {
                            Effect::SendRequest { request_id, user_turn } => {
                                prop_assert!(outstanding.is_none(), "second request while one is outstanding");
                                outstanding = Some((request_id.clone(), user_turn.clone()));
                            }
                            Effect::CommitExchange { user_turn, .. } => {
                                let (_, pending) = outstanding.as_ref().expect("commit without request");
                                prop_assert_eq!(user_turn, pending);
                            }
                            Effect::Resolve { request_id, .. } => {
                                let (pending_id, _) = outstanding.take().expect("resolve without request");
                                prop_assert_eq!(request_id, &pending_id);
                            }
                            _ => {}
                        }
                    }
                    state = result.new_state;
                }
                Err(TransitionError::Busy) => prop_assert!(was_busy),
                Err(TransitionError::EmptyInput) => prop_assert!(!was_busy),
                Err(TransitionError::Stale(_)) => {}
                Err(TransitionError::Disabled(_)) => prop_assert!(false, "context is enabled"),
            }

            prop_assert_eq!(state.is_busy(), outstanding.is_some());
        }
    }

    #[test]
    fn prop_busy_state_rejects_every_submission(text in "[a-z]{1,12}") {
        let state = TurnState::AwaitingResponse {
            request_id: "r1".to_string(),
            user_turn: Turn::user("first"),
        };
        let event = Event::Submit {
            text,
            origin: Origin::User,
            request_id: "r2".to_string(),
        };
        prop_assert_eq!(transition(&state, &test_context(), event).unwrap_err(), TransitionError::Busy);
    }
}
