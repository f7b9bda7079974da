//! Cancellable delayed return to the neutral emotion

use crate::bus::{AvatarEvent, EventBus};
use crate::llm::Emotion;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REVERT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Default)]
struct EmotionState {
    current: Emotion,
    pending: Option<CancellationToken>,
}

/// Holds the displayed emotion and at most one pending revert.
///
/// Setting an emotion cancels the pending revert and publishes the new emotion
/// under the same lock a firing revert holds while it re-checks its token and
/// publishes neutral. A revert scheduled for an older emotion can never
/// publish after a newer emotion was set.
pub struct EmotionRevertTimer {
    bus: Arc<dyn EventBus>,
    delay: Duration,
    state: Arc<Mutex<EmotionState>>,
}

impl EmotionRevertTimer {
    pub fn new(bus: Arc<dyn EventBus>, delay: Duration) -> Self {
        Self {
            bus,
            delay,
            state: Arc::new(Mutex::new(EmotionState::default())),
        }
    }

    pub fn current(&self) -> Emotion {
        lock(&self.state).current
    }

    #[cfg(test)]
    pub fn has_pending_revert(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    /// Publish `emotion`, record it as displayed and (re)schedule the revert.
    ///
    /// Must be called from within a tokio runtime when `emotion` is not neutral.
    pub fn on_emotion_changed(&self, emotion: Emotion) {
        let mut state = lock(&self.state);
        if let Some(previous) = state.pending.take() {
            previous.cancel();
        }
        state.current = emotion;
        tracing::debug!(emotion = %emotion, "Emotion changed");
        self.bus.publish(AvatarEvent::EmotionChanged { emotion });

        if emotion.is_default() {
            return;
        }

        let token = CancellationToken::new();
        state.pending = Some(token.clone());
        drop(state);

        let shared = Arc::clone(&self.state);
        let bus = Arc::clone(&self.bus);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let mut state = lock(&shared);
                    if token.is_cancelled() {
                        return;
                    }
                    state.pending = None;
                    state.current = Emotion::Neutral;
                    tracing::debug!(from = %emotion, "Emotion reverted to neutral");
                    bus.publish(AvatarEvent::EmotionChanged {
                        emotion: Emotion::Neutral,
                    });
                    bus.publish(AvatarEvent::Settled);
                }
            }
        });
    }

    /// Drop any pending revert without publishing.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.state).pending.take() {
            token.cancel();
        }
    }
}

impl Drop for EmotionRevertTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The state holds no invariants a panicking holder could break halfway.
fn lock(state: &Mutex<EmotionState>) -> MutexGuard<'_, EmotionState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
