//! Server-Sent Events support

use crate::bus::AvatarEvent;
use crate::runtime::HistorySnapshot;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Initial snapshot followed by every bus event
pub fn sse_stream(
    init: HistorySnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<AvatarEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move { Ok(init_event(&init)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(avatar_event_to_axum(&event))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn init_event(snapshot: &HistorySnapshot) -> Event {
    let data = json!({
        "type": "init",
        "history": snapshot.history,
        "busy": snapshot.busy,
        "emotion": snapshot.emotion,
    });
    Event::default().event("init").data(data.to_string())
}

fn avatar_event_to_axum(event: &AvatarEvent) -> Event {
    let data = serde_json::to_string(event)
        .unwrap_or_else(|_| json!({ "type": event.name() }).to_string());
    Event::default().event(event.name()).data(data)
}
