//! Turn state machine
//!
//! Pure transitions in the Elm style: `transition(state, context, event)`
//! returns the next state plus the effects the runtime must execute. Nothing
//! in here performs I/O.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, TurnError};
pub use event::{Event, Origin};
pub use state::{TurnContext, TurnState, DEFAULT_NETWORK_FAILURE_CAPTION};
pub use transition::{transition, TransitionError, TransitionResult};
