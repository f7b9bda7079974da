//! Fan-out of a parsed reply to emotion, prop and speech signals

mod revert;

pub use revert::{EmotionRevertTimer, DEFAULT_REVERT_DELAY};

use crate::bus::{AvatarEvent, EventBus};
use crate::llm::{Emotion, StructuredResponse};
use crate::speech::SpeechSynthesizer;
use std::sync::Arc;
use std::time::Duration;

/// Side-effect only; never touches the history.
pub struct ReactionDispatcher {
    bus: Arc<dyn EventBus>,
    timer: EmotionRevertTimer,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
}

impl ReactionDispatcher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        revert_delay: Duration,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            timer: EmotionRevertTimer::new(Arc::clone(&bus), revert_delay),
            bus,
            speech,
        }
    }

    pub fn current_emotion(&self) -> Emotion {
        self.timer.current()
    }

    pub fn dispatch(&self, response: &StructuredResponse) {
        self.set_emotion(response.emotion);

        match &response.spawn_object {
            Some(keyword) => self.bus.publish(AvatarEvent::SpawnRequested {
                keyword: keyword.clone(),
            }),
            None => self.bus.publish(AvatarEvent::SpawnCleared),
        }

        if let Some(speech) = &self.speech {
            if !response.reply.is_empty() {
                speech.speak(&response.reply);
            }
        }
    }

    /// Publish neutral through the same path as a reply would.
    pub fn reset_emotion(&self) {
        self.set_emotion(Emotion::Neutral);
    }

    fn set_emotion(&self, emotion: Emotion) {
        self.timer.on_emotion_changed(emotion);
    }
}
