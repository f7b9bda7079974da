//! One structured round trip to the generative service

use super::structured::{parse_structured_reply, ParsedReply, StructuredOutputError};
use super::{LlmError, LlmRequest, LlmService, LoggingService};
use crate::history::Turn;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single `send`
#[derive(Debug, Error, Clone)]
pub enum SendError {
    /// Transport failure, timeout, non-2xx status or an unusable body
    #[error("generative service request failed: {0}")]
    Network(#[from] LlmError),
    /// The model answered but no structured reply could be extracted
    #[error("could not parse model reply: {source}")]
    Parse {
        raw: String,
        #[source]
        source: StructuredOutputError,
    },
}

/// Sends instruction + turn window and parses the structured reply.
///
/// Cheap to clone; the provider is shared.
#[derive(Clone)]
pub struct GenerativeClient {
    service: Arc<dyn LlmService>,
}

impl GenerativeClient {
    /// Wrap `service` in request logging.
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self {
            service: Arc::new(LoggingService::new(service)),
        }
    }

    /// `history` followed by `user_turn` is sent as the request contents.
    pub async fn send(
        &self,
        instruction: &str,
        history: &[Turn],
        user_turn: &Turn,
    ) -> Result<ParsedReply, SendError> {
        let mut contents = Vec::with_capacity(history.len() + 1);
        contents.extend_from_slice(history);
        contents.push(user_turn.clone());

        let request = LlmRequest::new(instruction, contents);
        let response = self.service.complete(&request).await?;

        parse_structured_reply(&response.text).map_err(|source| {
            tracing::warn!(error = %source, raw = %response.text, "Unparseable model reply");
            SendError::Parse {
                raw: response.text,
                source,
            }
        })
    }
}
