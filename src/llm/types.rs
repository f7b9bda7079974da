//! Common types for LLM interactions

use crate::history::Turn;

/// One `generateContent` request: instruction text plus the turn window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    pub system: String,
    pub contents: Vec<Turn>,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, contents: Vec<Turn>) -> Self {
        Self {
            system: system.into(),
            contents,
        }
    }
}

/// Raw text of the first candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
}

impl LlmResponse {
    #[cfg(test)]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: Usage::default(),
        }
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
