use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use bytes::Bytes;
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::config::SSE_KEEPALIVE_SECS;
use crate::state::{AppState, PreSerializedEvent, overlay_json};

/// Streams `snapshot` events (render plans) and `overlay` events. New clients
/// get the current snapshot first, then the overlay if one is showing.
pub async fn render_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        // Subscribe before reading the snapshot so nothing published in between is lost.
        let rx = state.event_tx.subscribe();
        let mut stream = BroadcastStream::new(rx);

        let (seq, data) = current_snapshot(&state).await;
        if let Some(event) = snapshot_event(seq, &data) {
            yield Ok(event);
        }

        let overlay = {
            let overlay = state.overlay.read().await;
            overlay
                .current()
                .is_some()
                .then(|| overlay_json(&overlay))
        };
        match overlay {
            Some(Ok(json)) => {
                if let Some(payload) = event_payload(&json) {
                    yield Ok(Event::default().event("overlay").data(payload));
                }
            }
            Some(Err(e)) => warn!(error = %e, "failed to serialize overlay for new SSE client"),
            None => {}
        }

        while let Some(result) = stream.next().await {
            match result {
                Ok(PreSerializedEvent::Snapshot { seq, json }) => {
                    if let Some(event) = snapshot_event(seq, &json) {
                        yield Ok(event);
                    }
                }
                Ok(PreSerializedEvent::Overlay { revision, json }) => {
                    let Some(payload) = event_payload(&json) else {
                        warn!(revision, "overlay payload is not valid utf-8; dropping SSE event");
                        continue;
                    };
                    yield Ok(Event::default().event("overlay").data(payload));
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "SSE client lagged behind broadcast buffer; replaying snapshot"
                    );
                    state.observability.record_sse_lagged_events(skipped);
                    let (seq, data) = current_snapshot(&state).await;
                    if let Some(event) = snapshot_event(seq, &data) {
                        yield Ok(event);
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keep-alive"),
    )
}

async fn current_snapshot(state: &AppState) -> (u64, Arc<Bytes>) {
    let snapshot = state.render_snapshot.read().await;
    (snapshot.seq, snapshot.snapshot_json.clone())
}

fn snapshot_event(seq: u64, data: &Bytes) -> Option<Event> {
    if data.is_empty() {
        return None;
    }
    let Some(payload) = event_payload(data) else {
        warn!(seq, "snapshot payload is not valid utf-8; skipping SSE snapshot event");
        return None;
    };
    Some(
        Event::default()
            .id(seq.to_string())
            .event("snapshot")
            .data(payload),
    )
}

fn event_payload(bytes: &Bytes) -> Option<&str> {
    std::str::from_utf8(bytes.as_ref()).ok()
}
