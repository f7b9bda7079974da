//! Turn runtime executor

use super::traits::InstructionSource;
use super::{Command, HistorySnapshot, Submission, TurnCoordinator};

use crate::bus::{AvatarEvent, EventBus};
use crate::history::HistoryStore;
use crate::llm::GenerativeClient;
use crate::reaction::ReactionDispatcher;
use crate::state_machine::{
    transition, Effect, Event, TransitionError, TransitionResult, TurnContext, TurnError,
    TurnState,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type ReplySender = oneshot::Sender<Result<Submission, TurnError>>;

/// Owns the turn state and history; the only writer of either.
pub struct TurnRuntime {
    context: TurnContext,
    state: TurnState,
    history: HistoryStore,
    client: GenerativeClient,
    instructions: Arc<dyn InstructionSource>,
    dispatcher: ReactionDispatcher,
    bus: Arc<dyn EventBus>,
    command_rx: mpsc::Receiver<Command>,
    /// Results of background requests
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    /// Callers waiting on an accepted submission, by request id
    pending_replies: HashMap<String, ReplySender>,
}

impl TurnRuntime {
    /// Build the runtime and its handle. Run it with `tokio::spawn(runtime.run())`.
    pub fn new(
        context: TurnContext,
        history: HistoryStore,
        client: GenerativeClient,
        instructions: Arc<dyn InstructionSource>,
        dispatcher: ReactionDispatcher,
        bus: Arc<dyn EventBus>,
    ) -> (Self, TurnCoordinator) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(8);

        let runtime = Self {
            context,
            state: TurnState::Idle,
            history,
            client,
            instructions,
            dispatcher,
            bus,
            command_rx,
            event_rx,
            event_tx,
            pending_replies: HashMap::new(),
        };
        (runtime, TurnCoordinator::new(command_tx))
    }

    /// Start the runtime on the current tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(
            model = %self.context.model_id,
            enabled = self.context.is_enabled(),
            turns = self.history.len(),
            "Starting turn runtime"
        );

        // Process commands and background results in one loop - no recursion
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.event_rx.recv() => self.process_event(event),
            }
        }

        tracing::info!("Turn runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit {
                text,
                origin,
                reply,
            } => {
                let request_id = uuid::Uuid::new_v4().to_string();
                let event = Event::Submit {
                    text,
                    origin,
                    request_id: request_id.clone(),
                };

                match transition(&self.state, &self.context, event) {
                    Ok(result) => {
                        tracing::info!(request_id = %request_id, ?origin, "Submission accepted");
                        self.pending_replies.insert(request_id, reply);
                        self.apply(result);
                    }
                    Err(TransitionError::Busy | TransitionError::EmptyInput) => {
                        tracing::debug!(?origin, busy = self.state.is_busy(), "Submission ignored");
                        let _ = reply.send(Ok(Submission::Ignored));
                    }
                    Err(TransitionError::Disabled(reason)) => {
                        tracing::debug!(reason = %reason, "Submission refused, pipeline disabled");
                        let _ = reply.send(Err(TurnError::Config(reason)));
                    }
                    Err(e @ TransitionError::Stale(_)) => {
                        tracing::error!(error = %e, "Unexpected transition error on submit");
                        let _ = reply.send(Ok(Submission::Ignored));
                    }
                }
            }

            Command::Reset { reply } => {
                match transition(&self.state, &self.context, Event::Reset) {
                    Ok(result) => {
                        tracing::info!(pending = ?self.state.request_id(), "Resetting conversation");
                        self.apply(result);
                    }
                    Err(e) => tracing::error!(error = %e, "Reset refused"),
                }
                let _ = reply.send(());
            }

            Command::Snapshot { reply } => {
                let _ = reply.send(HistorySnapshot {
                    history: self.history.turns().to_vec(),
                    busy: self.state.is_busy(),
                    emotion: self.dispatcher.current_emotion(),
                });
            }
        }
    }

    fn process_event(&mut self, event: Event) {
        match transition(&self.state, &self.context, event) {
            Ok(result) => self.apply(result),
            Err(TransitionError::Stale(request_id)) => {
                tracing::info!(request_id = %request_id, "Discarding stale round-trip result");
            }
            Err(e) => tracing::error!(error = %e, "Unexpected transition error"),
        }
    }

    fn apply(&mut self, result: TransitionResult) {
        self.state = result.new_state;
        for effect in result.effects {
            self.execute_effect(effect);
        }
    }

    /// Execute an effect
    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::NotifyChatStarted => self.bus.publish(AvatarEvent::ChatStarted),

            Effect::SendRequest {
                request_id,
                user_turn,
            } => {
                let instruction = self.instructions.instruction();
                let history = self.history.request_history().to_vec();
                let client = self.client.clone();
                let event_tx = self.event_tx.clone();

                // The runtime loop never waits on the network
                tokio::spawn(async move {
                    tracing::debug!(request_id = %request_id, turns = history.len() + 1, "Sending request (background)");
                    let event = match client.send(&instruction, &history, &user_turn).await {
                        Ok(reply) => Event::ResponseReceived { request_id, reply },
                        Err(error) => Event::RequestFailed { request_id, error },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::CommitExchange {
                user_turn,
                model_turn,
            } => {
                let len = self.history.append([user_turn, model_turn]).len();
                tracing::debug!(turns = len, "Committed exchange");
            }

            Effect::Dispatch { response } => self.dispatcher.dispatch(&response),

            Effect::ShowCaption { text } => self.bus.publish(AvatarEvent::Caption { text }),

            Effect::ClearHistory => {
                if let Err(e) = self.history.clear() {
                    tracing::error!(error = %e, "Failed to delete chat history file");
                }
                self.bus.publish(AvatarEvent::HistoryCleared);
            }

            Effect::ResetEmotion => self.dispatcher.reset_emotion(),

            Effect::NotifyTurnFinished { outcome } => {
                self.bus.publish(AvatarEvent::TurnFinished { outcome });
            }

            Effect::Resolve { request_id, result } => {
                match self.pending_replies.remove(&request_id) {
                    Some(reply) => {
                        let _ = reply.send(result.map(Submission::Completed));
                    }
                    None => tracing::warn!(request_id = %request_id, "No caller waiting for result"),
                }
            }
        }
    }
}
