//! Situational context injected into the instruction text
//!
//! Local time with a coarse time-of-day bucket, plus the latest weather
//! snapshot refreshed by a cancellable background loop.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use reqwest::Client;
use serde::Deserialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_WEATHER_INTERVAL: Duration = Duration::from_secs(600);

/// Opaque text block for the prompt
pub trait ContextProvider: Send + Sync {
    fn context_block(&self) -> String;
}

impl<T: ContextProvider + ?Sized> ContextProvider for Arc<T> {
    fn context_block(&self) -> String {
        (**self).context_block()
    }
}

/// Fixed context text
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticContext(pub String);

#[cfg(test)]
impl ContextProvider for StaticContext {
    fn context_block(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Daytime,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => TimeOfDay::Morning,
            11..=16 => TimeOfDay::Daytime,
            17..=19 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Daytime => "daytime",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub description: String,
    pub temp_c: f64,
}

/// Render the block for a given instant and weather snapshot.
pub fn format_context_block(now: NaiveDateTime, weather: Option<&WeatherSnapshot>) -> String {
    let bucket = TimeOfDay::from_hour(now.hour());
    let weather = match weather {
        Some(w) => format!("Weather: {}, {:.1}°C", w.description, w.temp_c),
        None => "Weather: unavailable".to_string(),
    };
    format!(
        "[Current real-world information]\nCurrent time: {} ({})\n{}",
        now.format("%Y-%m-%d %H:%M"),
        bucket.label(),
        weather
    )
}

// ============================================================================
// Weather source
// ============================================================================

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(reqwest::Error),
    #[error("weather service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("weather response has no conditions")]
    Empty,
}

impl From<reqwest::Error> for WeatherError {
    /// Drops the request URL, which carries the `appid`.
    fn from(error: reqwest::Error) -> Self {
        WeatherError::Request(error.without_url())
    }
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, WeatherError>;
}

/// OpenWeatherMap current-weather endpoint (metric units)
pub struct OpenWeatherMap {
    client: Client,
    api_key: String,
    url: String,
}

impl OpenWeatherMap {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, WeatherError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            url: OPENWEATHER_URL.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct OwmResponse {
    #[serde(default)]
    weather: Vec<OwmCondition>,
    main: OwmMain,
}

#[derive(Deserialize)]
struct OwmCondition {
    description: String,
}

#[derive(Deserialize)]
struct OwmMain {
    temp: f64,
}

impl OwmResponse {
    fn into_snapshot(self) -> Result<WeatherSnapshot, WeatherError> {
        let condition = self.weather.into_iter().next().ok_or(WeatherError::Empty)?;
        Ok(WeatherSnapshot {
            description: condition.description,
            temp_c: self.main.temp,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherMap {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, WeatherError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status(status));
        }
        response.json::<OwmResponse>().await?.into_snapshot()
    }
}

// ============================================================================
// Real-world context
// ============================================================================

/// Local clock plus a periodically refreshed weather snapshot
pub struct RealWorldContext {
    weather: Arc<RwLock<Option<WeatherSnapshot>>>,
    refresher: Option<WeatherRefresher>,
}

struct WeatherRefresher {
    source: Arc<dyn WeatherSource>,
    interval: Duration,
    city: Mutex<String>,
    running: Mutex<CancellationToken>,
}

impl RealWorldContext {
    /// Clock only; the weather line always reads "unavailable".
    pub fn without_weather() -> Self {
        Self {
            weather: Arc::new(RwLock::new(None)),
            refresher: None,
        }
    }

    /// Start refreshing weather for `city` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_weather(source: Arc<dyn WeatherSource>, city: &str, interval: Duration) -> Self {
        let context = Self {
            weather: Arc::new(RwLock::new(None)),
            refresher: Some(WeatherRefresher {
                source,
                interval,
                city: Mutex::new(city.to_string()),
                running: Mutex::new(CancellationToken::new()),
            }),
        };
        context.restart_refresh();
        context
    }

    pub fn weather(&self) -> Option<WeatherSnapshot> {
        self.weather.read().ok().and_then(|w| w.clone())
    }

    pub fn city(&self) -> Option<String> {
        let refresher = self.refresher.as_ref()?;
        refresher.city.lock().ok().map(|c| c.clone())
    }

    /// Change the city and restart the refresh loop immediately.
    ///
    /// Returns false when weather is disabled or `city` is blank.
    pub fn set_location(&self, city: &str) -> bool {
        let city = city.trim();
        let Some(refresher) = &self.refresher else {
            return false;
        };
        if city.is_empty() {
            return false;
        }

        if let Ok(mut current) = refresher.city.lock() {
            tracing::info!(from = %current, to = %city, "Changing weather location");
            *current = city.to_string();
        }
        if let Ok(mut weather) = self.weather.write() {
            *weather = None;
        }
        self.restart_refresh();
        true
    }

    fn restart_refresh(&self) {
        let Some(refresher) = &self.refresher else {
            return;
        };
        let Some(city) = self.city() else {
            return;
        };

        let token = CancellationToken::new();
        if let Ok(mut running) = refresher.running.lock() {
            running.cancel();
            *running = token.clone();
        }

        let source = Arc::clone(&refresher.source);
        let weather = Arc::clone(&self.weather);
        let interval = refresher.interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    result = source.fetch(&city) => match result {
                        Ok(snapshot) => {
                            tracing::info!(
                                city = %city,
                                weather = %snapshot.description,
                                temp_c = snapshot.temp_c,
                                "Weather updated"
                            );
                            if let Ok(mut current) = weather.write() {
                                *current = Some(snapshot);
                            }
                        }
                        Err(e) => tracing::warn!(city = %city, error = %e, "Weather fetch failed"),
                    },
                }

                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            tracing::debug!(city = %city, "Weather refresh stopped");
        });
    }
}

impl ContextProvider for RealWorldContext {
    fn context_block(&self) -> String {
        let now: DateTime<Local> = Local::now();
        format_context_block(now.naive_local(), self.weather().as_ref())
    }
}

impl Drop for RealWorldContext {
    fn drop(&mut self) {
        if let Some(refresher) = &self.refresher {
            if let Ok(running) = refresher.running.lock() {
                running.cancel();
            }
        }
    }
}
