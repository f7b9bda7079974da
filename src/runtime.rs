//! Single-writer turn runtime
//!
//! One runtime task owns the `TurnState` and the `HistoryStore`. Callers talk
//! to it through [`TurnCoordinator`], a cloneable handle over an mpsc channel,
//! and receive their result through a oneshot once the round trip settles.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::TurnRuntime;
pub use traits::*;

use crate::history::Turn;
use crate::llm::{Emotion, StructuredResponse};
use crate::state_machine::{Origin, TurnError};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Outcome of an accepted or refused submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The round trip succeeded and was committed
    Completed(StructuredResponse),
    /// Empty input, or another round trip was outstanding
    Ignored,
}

/// History contents, busy flag and displayed emotion at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySnapshot {
    pub history: Vec<Turn>,
    pub busy: bool,
    pub emotion: Emotion,
}

/// Requests from handles to the runtime task
#[derive(Debug)]
pub(crate) enum Command {
    Submit {
        text: String,
        origin: Origin,
        reply: oneshot::Sender<Result<Submission, TurnError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<HistorySnapshot>,
    },
}

/// Handle to the running turn pipeline
#[derive(Clone)]
pub struct TurnCoordinator {
    command_tx: mpsc::Sender<Command>,
}

impl TurnCoordinator {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>) -> Self {
        Self { command_tx }
    }

    /// Submit user text. Resolves once the round trip has been committed
    /// (or failed); returns `Ignored` immediately while another is outstanding.
    pub async fn submit(&self, text: impl Into<String>) -> Result<Submission, TurnError> {
        self.submit_with_origin(text.into(), Origin::User).await
    }

    /// Same pipeline, but without announcing `ChatStarted`.
    pub async fn submit_stage_direction(
        &self,
        text: impl Into<String>,
    ) -> Result<Submission, TurnError> {
        self.submit_with_origin(text.into(), Origin::StageDirection)
            .await
    }

    async fn submit_with_origin(
        &self,
        text: String,
        origin: Origin,
    ) -> Result<Submission, TurnError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            text,
            origin,
            reply,
        })
        .await?;
        rx.await.map_err(|_| TurnError::Shutdown)?
    }

    /// Clear history, return to idle and reset the emotion.
    pub async fn reset(&self) -> Result<(), TurnError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        rx.await.map_err(|_| TurnError::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<HistorySnapshot, TurnError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| TurnError::Shutdown)
    }

    async fn send(&self, command: Command) -> Result<(), TurnError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TurnError::Shutdown)
    }
}
