//! Trait abstractions for runtime inputs
//!
//! These traits let the executor run against fixed inputs in tests.

use std::sync::Arc;

/// Produces the instruction text for the next request
pub trait InstructionSource: Send + Sync {
    fn instruction(&self) -> String;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

impl<T: InstructionSource + ?Sized> InstructionSource for Arc<T> {
    fn instruction(&self) -> String {
        (**self).instruction()
    }
}
