//! Mock implementations for testing
//!
//! These mocks enable integration testing of the turn pipeline without real
//! I/O.

use super::traits::InstructionSource;
use super::{Submission, TurnCoordinator, TurnRuntime};
use crate::bus::RecordingBus;
use crate::history::HistoryStore;
use crate::llm::{GenerativeClient, LlmError, LlmRequest, LlmResponse, LlmService};
use crate::reaction::ReactionDispatcher;
use crate::speech::SpeechSynthesizer;
use crate::state_machine::{TurnContext, TurnError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a successful response carrying `text`
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::from_text(text));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> Result<LlmResponse, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.next_response()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Gated Mock LLM Client (for in-flight testing)
// ============================================================================

/// Mock LLM client that holds every request until released
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
    release: Arc<Notify>,
}

impl DelayedMockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            inner: MockLlmClient::new(model_id),
            request_started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.inner.queue_text(text);
    }

    /// Let one held request complete
    pub fn release_one(&self) {
        self.release.notify_one();
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.inner.recorded_requests()
    }
}

#[async_trait]
impl LlmService for DelayedMockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_one();
        self.release.notified().await;
        self.inner.next_response()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Recording collaborators
// ============================================================================

/// Speech synthesizer that remembers what it was asked to say
#[derive(Default)]
pub struct RecordingSynthesizer {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSynthesizer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }
}

/// Fixed instruction text
pub struct StaticInstruction(pub String);

impl InstructionSource for StaticInstruction {
    fn instruction(&self) -> String {
        self.0.clone()
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

pub const TEST_INSTRUCTION: &str = "test instruction";

/// A running pipeline wired to recording collaborators
pub struct TestRuntime<L: LlmService + 'static> {
    pub coordinator: TurnCoordinator,
    pub bus: Arc<RecordingBus>,
    pub llm: Arc<L>,
    pub speech: Arc<RecordingSynthesizer>,
    pub history_path: PathBuf,
    _dir: TempDir,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime<MockLlmClient> {
    /// Builder with an instant mock client
    pub fn builder() -> TestRuntimeBuilder<MockLlmClient> {
        TestRuntimeBuilder::new(MockLlmClient::new("test-model"))
    }
}

pub struct TestRuntimeBuilder<L> {
    llm: L,
    max_turns: usize,
    disabled: Option<String>,
    revert_delay: Duration,
}

impl<L: LlmService + 'static> TestRuntimeBuilder<L> {
    pub fn new(llm: L) -> Self {
        Self {
            llm,
            max_turns: 10,
            disabled: None,
            revert_delay: Duration::from_secs(3),
        }
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn disabled(mut self, reason: impl Into<String>) -> Self {
        self.disabled = Some(reason.into());
        self
    }

    pub fn build(self) -> TestRuntime<L> {
        let dir = TempDir::new().unwrap();
        let history_path = dir.path().join("chat_history.json");
        let bus = Arc::new(RecordingBus::new());
        let speech = Arc::new(RecordingSynthesizer::default());
        let llm = Arc::new(self.llm);

        let context = match self.disabled {
            Some(reason) => TurnContext::disabled("test-model", reason),
            None => TurnContext::new("test-model"),
        };
        let dispatcher = ReactionDispatcher::new(
            bus.clone(),
            self.revert_delay,
            Some(speech.clone() as Arc<dyn SpeechSynthesizer>),
        );

        let (runtime, coordinator) = TurnRuntime::new(
            context,
            HistoryStore::load(&history_path, self.max_turns),
            GenerativeClient::new(llm.clone()),
            Arc::new(StaticInstruction(TEST_INSTRUCTION.to_string())),
            dispatcher,
            bus.clone(),
        );

        TestRuntime {
            coordinator,
            bus,
            llm,
            speech,
            history_path,
            _dir: dir,
            _runtime_handle: runtime.spawn(),
        }
    }
}

impl<L: LlmService + 'static> TestRuntime<L> {
    pub async fn submit(&self, text: &str) -> Result<Submission, TurnError> {
        self.coordinator.submit(text).await
    }

    pub async fn history(&self) -> Vec<crate::history::Turn> {
        self.coordinator.snapshot().await.unwrap().history
    }
}

// ============================================================================
// Integration tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AvatarEvent, TurnOutcome};
    use crate::history::Turn;
    use crate::llm::{Emotion, StructuredOutputError};

    const JOY_APPLE: &str = r#"{"emotion":"joy","reply":"hi!","spawnObject":"apple"}"#;

    fn reply_json(n: usize) -> String {
        format!(r#"{{"emotion":"neutral","reply":"r{n}"}}"#)
    }

    #[tokio::test]
    async fn test_successful_turn_fans_out_and_commits() {
        let rt = TestRuntime::builder().build();
        rt.llm.queue_text(JOY_APPLE);

        let result = rt.submit("hello").await.unwrap();
        let Submission::Completed(response) = result else {
            panic!("expected completion, got {result:?}");
        };
        assert_eq!(response.emotion, Emotion::Joy);
        assert_eq!(response.spawn_object.as_deref(), Some("apple"));

        assert_eq!(
            rt.bus.events(),
            vec![
                AvatarEvent::ChatStarted,
                AvatarEvent::Caption {
                    text: "hi!".to_string()
                },
                AvatarEvent::EmotionChanged { emotion: Emotion::Joy },
                AvatarEvent::SpawnRequested {
                    keyword: "apple".to_string()
                },
                AvatarEvent::TurnFinished {
                    outcome: TurnOutcome::Completed
                },
            ]
        );
        assert_eq!(rt.speech.spoken(), vec!["hi!".to_string()]);

        let expected = vec![Turn::user("hello"), Turn::model(JOY_APPLE)];
        assert_eq!(rt.history().await, expected);

        // Persisted before the caller was answered
        let reloaded = HistoryStore::load(&rt.history_path, 10);
        assert_eq!(reloaded.turns(), expected.as_slice());

        let requests = rt.llm.recorded_requests();
        assert_eq!(requests[0].system, TEST_INSTRUCTION);
        assert_eq!(requests[0].contents, vec![Turn::user("hello")]);
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_ignored() {
        let rt = TestRuntimeBuilder::new(DelayedMockLlmClient::new("test-model")).build();
        rt.llm.queue_text(JOY_APPLE);

        let first = {
            let coordinator = rt.coordinator.clone();
            tokio::spawn(async move { coordinator.submit("hello").await })
        };
        rt.llm.request_started.notified().await;

        let second = rt.submit("are you there?").await.unwrap();
        assert_eq!(second, Submission::Ignored);
        assert_eq!(rt.llm.recorded_requests().len(), 1);

        let snapshot = rt.coordinator.snapshot().await.unwrap();
        assert!(snapshot.busy);
        assert!(snapshot.history.is_empty());

        rt.llm.release_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, Submission::Completed(_)));
        assert_eq!(rt.history().await.len(), 2);
        assert!(!rt.coordinator.snapshot().await.unwrap().busy);
    }

    #[tokio::test]
    async fn test_history_keeps_most_recent_turns() {
        let rt = TestRuntime::builder().max_turns(2).build();

        for n in 0..4 {
            rt.llm.queue_text(&reply_json(n));
            let result = rt.submit(&format!("u{n}")).await.unwrap();
            assert!(matches!(result, Submission::Completed(_)));
        }

        assert_eq!(
            rt.history().await,
            vec![
                Turn::user("u2"),
                Turn::model(reply_json(2)),
                Turn::user("u3"),
                Turn::model(reply_json(3)),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_window_is_trimmed_to_cap() {
        let rt = TestRuntime::builder().max_turns(1).build();
        rt.llm.queue_text(&reply_json(0));
        rt.llm.queue_text(&reply_json(1));

        rt.submit("u0").await.unwrap();
        rt.submit("u1").await.unwrap();

        let requests = rt.llm.recorded_requests();
        assert_eq!(
            requests[1].contents,
            vec![Turn::model(reply_json(0)), Turn::user("u1")]
        );
    }

    #[tokio::test]
    async fn test_prose_wrapped_reply_without_prop_clears_spawn() {
        let rt = TestRuntime::builder().build();
        rt.llm
            .queue_text("sure! ```json {\"emotion\":\"neutral\",\"reply\":\"ok\"} ``` thanks");

        let result = rt.submit("hello").await.unwrap();
        assert!(matches!(result, Submission::Completed(ref r) if r.reply == "ok"));

        let events = rt.bus.events();
        assert!(events.contains(&AvatarEvent::SpawnCleared));
        assert!(!events
            .iter()
            .any(|e| matches!(e, AvatarEvent::SpawnRequested { .. })));
        assert_eq!(
            rt.history().await[1],
            Turn::model("{\"emotion\":\"neutral\",\"reply\":\"ok\"}")
        );
    }

    #[tokio::test]
    async fn test_network_failure_leaves_history_and_recovers() {
        let rt = TestRuntime::builder().build();
        rt.llm.queue_error(LlmError::network("connection reset"));
        rt.llm.queue_text(JOY_APPLE);

        let err = rt.submit("hello").await.unwrap_err();
        assert!(matches!(err, TurnError::Network(_)));
        assert!(rt.history().await.is_empty());
        assert!(!rt.coordinator.snapshot().await.unwrap().busy);
        assert!(!rt.history_path.exists());

        let events = rt.bus.take();
        assert!(events.contains(&AvatarEvent::TurnFinished {
            outcome: TurnOutcome::NetworkError
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, AvatarEvent::EmotionChanged { .. })));

        let retry = rt.submit("hello").await.unwrap();
        assert!(matches!(retry, Submission::Completed(_)));
        assert_eq!(rt.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_shows_raw_text_and_drops_turn() {
        let rt = TestRuntime::builder().build();
        rt.llm.queue_text("I'd rather not use JSON.");

        let err = rt.submit("hello").await.unwrap_err();
        match err {
            TurnError::Parse { raw, reason } => {
                assert_eq!(raw, "I'd rather not use JSON.");
                assert_eq!(reason, StructuredOutputError::NoJsonObject);
            }
            other => panic!("expected parse error, got {other:?}"),
        }

        assert_eq!(
            rt.bus.events(),
            vec![
                AvatarEvent::ChatStarted,
                AvatarEvent::Caption {
                    text: "I'd rather not use JSON.".to_string()
                },
                AvatarEvent::TurnFinished {
                    outcome: TurnOutcome::ParseError
                },
            ]
        );
        assert!(rt.speech.spoken().is_empty());
        assert!(rt.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_stage_direction_does_not_announce_chat() {
        let rt = TestRuntime::builder().build();
        rt.llm.queue_text(r#"{"emotion":"shame","reply":"hey!"}"#);

        let result = rt
            .coordinator
            .submit_stage_direction("(The user gently patted your head)")
            .await
            .unwrap();
        assert!(matches!(result, Submission::Completed(_)));
        assert!(!rt.bus.events().contains(&AvatarEvent::ChatStarted));
        assert_eq!(rt.history().await[0], Turn::user("(The user gently patted your head)"));
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let rt = TestRuntime::builder().build();

        assert_eq!(rt.submit("   ").await.unwrap(), Submission::Ignored);
        assert!(rt.llm.recorded_requests().is_empty());
        assert!(rt.bus.events().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_pipeline_reports_config_error() {
        let rt = TestRuntime::builder().disabled("GEMINI_API_KEY is not set").build();

        let err = rt.submit("hello").await.unwrap_err();
        assert!(matches!(err, TurnError::Config(_)));
        assert!(rt.llm.recorded_requests().is_empty());
        assert!(rt.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_history_file() {
        let rt = TestRuntime::builder().build();
        rt.llm.queue_text(JOY_APPLE);
        rt.submit("hello").await.unwrap();
        assert!(rt.history_path.exists());
        rt.bus.take();

        rt.coordinator.reset().await.unwrap();

        assert!(rt.history().await.is_empty());
        assert!(!rt.history_path.exists());
        let events = rt.bus.take();
        assert!(events.contains(&AvatarEvent::HistoryCleared));
        assert!(events.contains(&AvatarEvent::EmotionChanged {
            emotion: Emotion::Neutral
        }));
    }

    #[tokio::test]
    async fn test_reset_while_awaiting_interrupts_and_discards_late_result() {
        let rt = TestRuntimeBuilder::new(DelayedMockLlmClient::new("test-model")).build();
        rt.llm.queue_text(&reply_json(0));
        rt.llm.queue_text(&reply_json(1));

        let first = {
            let coordinator = rt.coordinator.clone();
            tokio::spawn(async move { coordinator.submit("before reset").await })
        };
        rt.llm.request_started.notified().await;

        rt.coordinator.reset().await.unwrap();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, TurnError::Interrupted));
        assert!(rt.bus.events().contains(&AvatarEvent::TurnFinished {
            outcome: TurnOutcome::Interrupted
        }));

        // The late response for the interrupted request must not be committed
        rt.llm.release_one();
        let second = {
            let coordinator = rt.coordinator.clone();
            tokio::spawn(async move { coordinator.submit("after reset").await })
        };
        rt.llm.request_started.notified().await;
        rt.llm.release_one();
        let second = second.await.unwrap().unwrap();
        assert!(matches!(second, Submission::Completed(_)));

        let history = rt.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Turn::user("after reset"));
    }
}
