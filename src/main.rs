//! Avatar chat - Gemini-driven conversational avatar backend
//!
//! Turns speech-recognizer or touch input into structured Gemini round trips
//! and fans the replies out to captions, facial expression, props and speech.

mod api;
mod bus;
mod config;
mod context;
mod history;
mod llm;
mod reaction;
mod runtime;
mod speech;
mod state_machine;
mod system_prompt;
mod touch;

use api::{create_router, AppState};
use bus::{AvatarEvent, BroadcastBus};
use config::AppConfig;
use context::{OpenWeatherMap, RealWorldContext};
use history::HistoryStore;
use llm::{GeminiService, GenerativeClient};
use reaction::ReactionDispatcher;
use runtime::TurnRuntime;
use speech::{SpeechSynthesizer, VoicevoxBridge, WavFileSink};
use state_machine::TurnContext;
use system_prompt::{load_persona, PromptBuilder, DEFAULT_PERSONA};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatar_chat=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;

    let persona = match &config.persona_file {
        Some(path) => match load_persona(path) {
            Ok(persona) => {
                tracing::info!(path = %path.display(), "Loaded persona");
                persona
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read persona file, using default");
                DEFAULT_PERSONA.to_string()
            }
        },
        None => DEFAULT_PERSONA.to_string(),
    };

    // Real-world context
    let real_world = Arc::new(match &config.weather {
        Some(weather) => {
            let source = OpenWeatherMap::new(weather.api_key.clone(), config.request_timeout)?;
            tracing::info!(city = %weather.city, interval_secs = weather.interval.as_secs(), "Weather refresh enabled");
            RealWorldContext::with_weather(Arc::new(source), &weather.city, weather.interval)
        }
        None => {
            tracing::info!("OPENWEATHER_API_KEY not set, weather disabled");
            RealWorldContext::without_weather()
        }
    });
    let props: Vec<&str> = config.props.iter().map(String::as_str).collect();
    let prompt = PromptBuilder::new(persona, real_world.clone()).with_props(&props);

    // Generative service
    let service = GeminiService::new(
        config.api_key.clone().unwrap_or_default(),
        config.model.clone(),
        &config.base_url,
        config.request_timeout,
    )?;
    let model_id = config.model.to_string();
    let context = if config.api_key.is_some() {
        tracing::info!(model = %config.model, endpoint = %service.endpoint(), "Gemini client initialized");
        TurnContext::new(model_id)
    } else {
        tracing::error!("No Gemini API key configured. Set GEMINI_API_KEY or GEMINI_API_KEY_FILE.");
        TurnContext::disabled(model_id, "GEMINI_API_KEY is not set")
    };

    // Event fan-out
    let bus = Arc::new(BroadcastBus::default());
    let _event_log = bus.register(|event: &AvatarEvent| {
        tracing::debug!(event = event.name(), "Avatar event");
    });

    let speech: Option<Arc<dyn SpeechSynthesizer>> = match &config.voicevox {
        Some(voicevox) => {
            tracing::info!(url = %voicevox.url, speaker = voicevox.speaker, dir = %voicevox.audio_dir.display(), "VOICEVOX speech enabled");
            let sink = Arc::new(WavFileSink::new(&voicevox.audio_dir));
            Some(Arc::new(VoicevoxBridge::new(
                &voicevox.url,
                voicevox.speaker,
                config.request_timeout,
                sink,
            )?))
        }
        None => None,
    };
    let dispatcher = ReactionDispatcher::new(bus.clone(), config.emotion_revert_delay, speech);

    // Turn runtime
    let history = HistoryStore::load(&config.history_path, config.max_history_turns);
    let (runtime, coordinator) = TurnRuntime::new(
        context,
        history,
        GenerativeClient::new(Arc::new(service)),
        Arc::new(prompt),
        dispatcher,
        bus.clone(),
    );
    runtime.spawn();

    // Create application state
    let state = AppState::new(coordinator, config.touch_cooldown, bus, Some(real_world));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Avatar chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
