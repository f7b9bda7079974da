//! Explicit publish/subscribe for avatar signals
//!
//! Core components hold an `Arc<dyn EventBus>` and never reference the
//! subscribers (animation, prop spawner, UI) directly.

use crate::llm::Emotion;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Signals emitted by the turn pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AvatarEvent {
    /// A user-originated submission was accepted
    ChatStarted,
    EmotionChanged { emotion: Emotion },
    /// The revert timer returned the face to neutral
    Settled,
    SpawnRequested { keyword: String },
    SpawnCleared,
    /// Text to show in the caption area
    Caption { text: String },
    TurnFinished { outcome: TurnOutcome },
    HistoryCleared,
}

impl AvatarEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            AvatarEvent::ChatStarted => "chat_started",
            AvatarEvent::EmotionChanged { .. } => "emotion_changed",
            AvatarEvent::Settled => "settled",
            AvatarEvent::SpawnRequested { .. } => "spawn_requested",
            AvatarEvent::SpawnCleared => "spawn_cleared",
            AvatarEvent::Caption { .. } => "caption",
            AvatarEvent::TurnFinished { .. } => "turn_finished",
            AvatarEvent::HistoryCleared => "history_cleared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    NetworkError,
    ParseError,
    /// A reset discarded the in-flight round trip
    Interrupted,
}

pub trait EventBus: Send + Sync {
    fn publish(&self, event: AvatarEvent);
}

impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    fn publish(&self, event: AvatarEvent) {
        (**self).publish(event);
    }
}

/// Subscriber object registered on a [`BroadcastBus`]
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: &AvatarEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&AvatarEvent) + Send + Sync + 'static,
{
    fn handle(&self, event: &AvatarEvent) {
        self(event);
    }
}

/// Keeps a registered handler alive; dropping it deregisters the handler.
#[must_use = "dropping the guard deregisters the handler"]
pub struct HandlerGuard {
    _guard: DropGuard,
}

// ============================================================================
// Broadcast bus
// ============================================================================

/// Fan-out over a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<AvatarEvent>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AvatarEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver every subsequent event to `handler` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, handler: impl EventHandler) -> HandlerGuard {
        let mut rx = self.tx.subscribe();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => handler.handle(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Event handler lagged behind bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        HandlerGuard {
            _guard: token.drop_guard(),
        }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(128)
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: AvatarEvent) {
        tracing::debug!(event = event.name(), "Publishing avatar event");
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

// ============================================================================
// Recording bus (tests)
// ============================================================================

/// Stores every published event in order
#[cfg(test)]
#[derive(Default)]
pub struct RecordingBus {
    events: std::sync::Mutex<Vec<AvatarEvent>>,
}

#[cfg(test)]
impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AvatarEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Return and forget everything recorded so far
    pub fn take(&self) -> Vec<AvatarEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl EventBus for RecordingBus {
    fn publish(&self, event: AvatarEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
