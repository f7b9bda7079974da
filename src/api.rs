//! HTTP API for the avatar
//!
//! Speech recognizers and the rendering front end talk to the pipeline
//! through these routes; bus events stream out over SSE.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::bus::BroadcastBus;
use crate::context::RealWorldContext;
use crate::runtime::TurnCoordinator;
use crate::touch::TouchReactor;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: TurnCoordinator,
    pub touch: Arc<TouchReactor>,
    pub bus: Arc<BroadcastBus>,
    /// Present when the instruction carries real-world context
    pub context: Option<Arc<RealWorldContext>>,
}

impl AppState {
    pub fn new(
        coordinator: TurnCoordinator,
        touch_cooldown: Duration,
        bus: Arc<BroadcastBus>,
        context: Option<Arc<RealWorldContext>>,
    ) -> Self {
        Self {
            touch: Arc::new(TouchReactor::new(coordinator.clone(), touch_cooldown)),
            coordinator,
            bus,
            context,
        }
    }
}
