use async_trait::async_trait;
use axum::response::sse::Event;
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

/// Events queued between the session task and the response body.
const BODY_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Event stream client went away")]
pub struct SinkClosed;

/// Destination of server-sent events.
#[async_trait]
pub trait EventSink: Send {
    /// Write one event. It is not guaranteed to reach the client before [`EventSink::flush`].
    async fn send(&mut self, line: &str) -> Result<(), SinkClosed>;

    /// Push every written event to the client.
    async fn flush(&mut self) -> Result<(), SinkClosed>;

    /// Resolves once the client has disconnected.
    async fn closed(&self);
}

/// One log line as a server-sent event.
///
/// `Event::data` turns any stray line break into an extra `data:` field, so
/// the event framing holds whatever the line contains.
pub fn log_event(line: &str) -> Event {
    Event::default().data(line)
}

/// Sink that hands events to an HTTP response body through a channel.
///
/// Writes accumulate in a local buffer and only cross the channel on flush,
/// mirroring a buffered response writer.
pub struct ChannelSink {
    tx: mpsc::Sender<Event>,
    pending: Vec<Event>,
}

/// Create a sink and the event stream it feeds. Dropping the event stream
/// closes the sink.
pub fn channel() -> (
    ChannelSink,
    impl Stream<Item = Result<Event, Infallible>> + Send + 'static,
) {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    (
        ChannelSink {
            tx,
            pending: Vec::new(),
        },
        events,
    )
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, line: &str) -> Result<(), SinkClosed> {
        if self.tx.is_closed() {
            return Err(SinkClosed);
        }
        self.pending.push(log_event(line));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkClosed> {
        for event in self.pending.drain(..) {
            self.tx.send(event).await.map_err(|_| SinkClosed)?;
        }
        Ok(())
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}
