//! Environment-driven configuration

use crate::context::DEFAULT_WEATHER_INTERVAL;
use crate::llm::{GeminiModel, DEFAULT_BASE_URL};
use crate::reaction::DEFAULT_REVERT_DELAY;
use crate::speech::{DEFAULT_SPEAKER, DEFAULT_VOICEVOX_URL};
use crate::system_prompt::DEFAULT_PROP_CATALOG;
use crate::touch::DEFAULT_TOUCH_COOLDOWN;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HISTORY_PATH: &str = "chat_history.json";
pub const DEFAULT_MAX_HISTORY_TURNS: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CITY: &str = "Tokyo,jp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("failed to read API key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("API key file {path} is not {{\"key\": \"...\"}}: {source}")]
    KeyFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Shape of `GEMINI_API_KEY_FILE`
#[derive(Deserialize)]
struct KeyFile {
    key: String,
}

#[derive(Debug, Clone)]
pub struct VoicevoxConfig {
    pub url: String,
    pub speaker: u32,
    /// Where synthesized replies are written
    pub audio_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub city: String,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` leaves the pipeline disabled
    pub api_key: Option<String>,
    pub model: GeminiModel,
    pub base_url: String,
    pub history_path: PathBuf,
    pub max_history_turns: usize,
    pub request_timeout: Duration,
    pub emotion_revert_delay: Duration,
    pub persona_file: Option<PathBuf>,
    /// Keywords the model may answer in `spawnObject`
    pub props: Vec<String>,
    pub port: u16,
    /// Speech is off unless `VOICEVOX_URL` or `AVATAR_AUDIO_DIR` is set
    pub voicevox: Option<VoicevoxConfig>,
    /// Weather is off without `OPENWEATHER_API_KEY`
    pub weather: Option<WeatherConfig>,
    pub touch_cooldown: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = match var("GEMINI_API_KEY") {
            Some(key) => Some(key),
            None => var("GEMINI_API_KEY_FILE")
                .map(|path| read_key_file(PathBuf::from(path)))
                .transpose()?
                .filter(|key| !key.is_empty()),
        };

        let voicevox_url = var("VOICEVOX_URL");
        let audio_dir = var("AVATAR_AUDIO_DIR");
        let voicevox = if voicevox_url.is_some() || audio_dir.is_some() {
            Some(VoicevoxConfig {
                url: voicevox_url.unwrap_or_else(|| DEFAULT_VOICEVOX_URL.to_string()),
                speaker: parse_or(var("VOICEVOX_SPEAKER"), "VOICEVOX_SPEAKER", DEFAULT_SPEAKER)?,
                audio_dir: PathBuf::from(audio_dir.unwrap_or_else(|| "audio".to_string())),
            })
        } else {
            None
        };

        let weather = match var("OPENWEATHER_API_KEY") {
            Some(api_key) => Some(WeatherConfig {
                api_key,
                city: var("AVATAR_CITY").unwrap_or_else(|| DEFAULT_CITY.to_string()),
                interval: secs_or(
                    var("AVATAR_WEATHER_INTERVAL_SECS"),
                    "AVATAR_WEATHER_INTERVAL_SECS",
                    DEFAULT_WEATHER_INTERVAL,
                )?,
            }),
            None => None,
        };

        let max_history_turns = parse_or(
            var("AVATAR_MAX_HISTORY_TURNS"),
            "AVATAR_MAX_HISTORY_TURNS",
            DEFAULT_MAX_HISTORY_TURNS,
        )?;

        Ok(Self {
            api_key,
            model: var("AVATAR_MODEL")
                .map(|name| GeminiModel::from_name(&name))
                .unwrap_or_default(),
            base_url: var("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            history_path: PathBuf::from(
                var("AVATAR_HISTORY_PATH").unwrap_or_else(|| DEFAULT_HISTORY_PATH.to_string()),
            ),
            max_history_turns,
            request_timeout: secs_or(
                var("AVATAR_REQUEST_TIMEOUT_SECS"),
                "AVATAR_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT,
            )?,
            emotion_revert_delay: secs_or(
                var("AVATAR_EMOTION_REVERT_SECS"),
                "AVATAR_EMOTION_REVERT_SECS",
                DEFAULT_REVERT_DELAY,
            )?,
            persona_file: var("AVATAR_PERSONA_FILE").map(PathBuf::from),
            props: var("AVATAR_PROPS").map_or_else(
                || DEFAULT_PROP_CATALOG.iter().map(|p| (*p).to_string()).collect(),
                |list| parse_list(&list),
            ),
            port: parse_or(var("AVATAR_PORT"), "AVATAR_PORT", DEFAULT_PORT)?,
            voicevox,
            weather,
            touch_cooldown: secs_or(
                var("AVATAR_TOUCH_COOLDOWN_SECS"),
                "AVATAR_TOUCH_COOLDOWN_SECS",
                DEFAULT_TOUCH_COOLDOWN,
            )?,
        })
    }
}

fn read_key_file(path: PathBuf) -> Result<String, ConfigError> {
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(source) => return Err(ConfigError::KeyFile { path, source }),
    };
    match serde_json::from_str::<KeyFile>(&text) {
        Ok(file) => Ok(file.key.trim().to_string()),
        Err(source) => Err(ConfigError::KeyFormat { path, source }),
    }
}

/// Comma-separated, lowercased, blanks dropped
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Seconds, fractional allowed
fn secs_or(
    value: Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => match value.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
            _ => Err(ConfigError::Invalid { name, value }),
        },
    }
}
