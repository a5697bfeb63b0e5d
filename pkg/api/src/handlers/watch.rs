use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use pkg_state::watch::WatchEvent;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub seq: Option<u64>,
}

fn sse_event(event: &WatchEvent) -> Option<Result<Event, Infallible>> {
    serde_json::to_string(event)
        .ok()
        .map(|data| Ok(Event::default().data(data)))
}

/// GET /api/v1/watch: SSE stream of state changes. `seq` replays the
/// retained backlog from that sequence number before going live;
/// `prefix` narrows the stream to one part of the key space.
pub async fn watch_events(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let prefix = query.prefix.unwrap_or_default();
    let from_seq = query.seq.unwrap_or(0);

    info!(
        "Watch subscription: prefix='{}', from_seq={}",
        prefix, from_seq
    );

    let log = &state.ledger.store().event_log;
    let backlog = log.events_since(from_seq).await;
    let live = BroadcastStream::new(log.subscribe());

    let matches = move |key: &str, prefix: &str| prefix.is_empty() || key.starts_with(prefix);

    let prefix_live = prefix.clone();
    let backlog_stream = tokio_stream::iter(
        backlog
            .into_iter()
            .filter(move |e| matches(&e.key, &prefix))
            .filter_map(|e| sse_event(&e)),
    );
    let live_stream = live.filter_map(move |result| match result {
        Ok(event) if matches(&event.key, &prefix_live) => sse_event(&event),
        // Either a lagged subscriber or a non-matching key; skip and
        // keep streaming.
        _ => None,
    });

    Sse::new(backlog_stream.chain(live_stream)).keep_alive(KeepAlive::default())
}
