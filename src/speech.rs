//! Speech synthesis bridge
//!
//! The pipeline only decides whether and when to speak. `VoicevoxBridge`
//! turns text into WAV bytes through a local VOICEVOX engine and hands them
//! to an [`AudioSink`]; playback itself happens elsewhere.

use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_VOICEVOX_URL: &str = "http://127.0.0.1:50021";
pub const DEFAULT_SPEAKER: u32 = 2;

/// Fire-and-forget speech output
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, text: &str);
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("VOICEVOX {stage} request failed: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("VOICEVOX {stage} returned HTTP {status}")]
    Status {
        stage: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("cannot write audio to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpeechError {
    fn request(stage: &'static str, source: reqwest::Error) -> Self {
        SpeechError::Request {
            stage,
            source: source.without_url(),
        }
    }
}

/// Receives synthesized WAV audio
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, wav: Vec<u8>) -> Result<(), SpeechError>;
}

// ============================================================================
// VOICEVOX
// ============================================================================

#[derive(Clone)]
pub struct VoicevoxBridge {
    client: Client,
    base_url: String,
    speaker: u32,
    sink: Arc<dyn AudioSink>,
}

impl VoicevoxBridge {
    pub fn new(
        base_url: &str,
        speaker: u32,
        timeout: Duration,
        sink: Arc<dyn AudioSink>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            speaker,
            sink,
        })
    }

    /// `audio_query` followed by `synthesis`; returns WAV bytes.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let speaker = self.speaker.to_string();

        let query = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("speaker", speaker.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|source| SpeechError::request("audio_query", source))?;
        let query = check_status(query, "audio_query")?
            .text()
            .await
            .map_err(|source| SpeechError::request("audio_query", source))?;

        let synthesis = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(query)
            .send()
            .await
            .map_err(|source| SpeechError::request("synthesis", source))?;
        let wav = check_status(synthesis, "synthesis")?
            .bytes()
            .await
            .map_err(|source| SpeechError::request("synthesis", source))?;

        Ok(wav.to_vec())
    }
}

fn check_status(
    response: reqwest::Response,
    stage: &'static str,
) -> Result<reqwest::Response, SpeechError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SpeechError::Status { stage, status })
    }
}

impl SpeechSynthesizer for VoicevoxBridge {
    fn speak(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let bridge = self.clone();
        let text = text.to_string();

        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let result = match bridge.synthesize(&text).await {
                Ok(wav) => bridge.sink.play(wav).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => tracing::info!(
                    duration_ms = %start.elapsed().as_millis(),
                    chars = text.chars().count(),
                    "Speech synthesized"
                ),
                Err(e) => tracing::error!(error = %e, "Speech synthesis failed"),
            }
        });
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Writes each clip to `<dir>/reply-<n>.wav`
pub struct WavFileSink {
    dir: PathBuf,
    counter: AtomicU64,
}

impl WavFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl AudioSink for WavFileSink {
    async fn play(&self, wav: Vec<u8>) -> Result<(), SpeechError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("reply-{n}.wav"));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SpeechError::Io {
                path: self.dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, wav)
            .await
            .map_err(|source| SpeechError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "Wrote speech audio");
        Ok(())
    }
}
