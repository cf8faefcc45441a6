//! Log stream adapter.
//!
//! Relays a container's log byte stream to a browser as server-sent events,
//! one event per log line, flushed as soon as the line is complete.

use axum::response::sse::Event;
use futures::Stream;
use std::convert::Infallible;

use crate::engine::LogByteStream;

pub mod framer;
pub mod session;
pub mod sink;

use session::LogSession;

/// Start a session relaying `logs` in the background and return the
/// events it writes. The session ends when the event stream is dropped.
pub fn spawn_session(
    container: String,
    logs: LogByteStream,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let (mut sink, events) = sink::channel();
    tokio::spawn(async move {
        LogSession::new(container).run(logs, &mut sink).await;
    });
    events
}
