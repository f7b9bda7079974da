//! Touch reactions
//!
//! A touch on the avatar becomes a stage direction sent through the normal
//! turn pipeline, so the model reacts in character.

use crate::runtime::{Submission, TurnCoordinator};
use crate::state_machine::TurnError;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TOUCH_COOLDOWN: Duration = Duration::from_secs(2);

/// Touchable regions of the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyPart {
    Head,
    Body,
    Arm,
    Hand,
    Chest,
    Buttocks,
}

impl BodyPart {
    /// Narration sent on the user's behalf
    pub fn stage_direction(self) -> &'static str {
        match self {
            BodyPart::Head => "(The user gently patted your head)",
            BodyPart::Body => "(The user poked your tummy)",
            BodyPart::Arm => "(The user touched your arm)",
            BodyPart::Hand => "(The user held your hand)",
            BodyPart::Chest => "(The user touched your chest)",
            BodyPart::Buttocks => "(The user touched your bottom)",
        }
    }
}

/// Rate-limits touches and forwards them as stage directions
pub struct TouchReactor {
    coordinator: TurnCoordinator,
    cooldown: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl TouchReactor {
    pub fn new(coordinator: TurnCoordinator, cooldown: Duration) -> Self {
        Self {
            coordinator,
            cooldown,
            last_accepted: Mutex::new(None),
        }
    }

    /// Submit the stage direction for `part`, unless another touch was
    /// accepted within the cooldown.
    pub async fn touch(&self, part: BodyPart) -> Result<Submission, TurnError> {
        if !self.try_accept(Instant::now()) {
            tracing::debug!(?part, "Touch dropped during cooldown");
            return Ok(Submission::Ignored);
        }

        tracing::info!(?part, "Body part touched");
        self.coordinator
            .submit_stage_direction(part.stage_direction())
            .await
    }

    fn try_accept(&self, now: Instant) -> bool {
        let mut last = match self.last_accepted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.is_some_and(|at| now.duration_since(at) < self.cooldown) {
            return false;
        }
        *last = Some(now);
        true
    }
}
