use futures::StreamExt;
use uuid::Uuid;

use super::framer::LineFramer;
use super::sink::{EventSink, SinkClosed};
use crate::engine::{EngineError, LogByteStream};

/// Why a stream session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The container's log stream finished.
    EndOfStream,
    /// The client went away. The engine stream was dropped right away.
    ClientDisconnected,
    /// Reading from the engine failed. Not retried.
    ReadError(EngineError),
}

/// One open log-streaming connection.
///
/// Owns the framing buffer for exactly one engine stream and one client.
#[derive(Debug)]
pub struct LogSession {
    id: Uuid,
    container: String,
    framer: LineFramer,
    events_sent: u64,
}

impl LogSession {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            container: container.into(),
            framer: LineFramer::default(),
            events_sent: 0,
        }
    }

    /// Relay `stream` into `sink` until the stream ends, fails, or the
    /// client disconnects. The stream is dropped before this returns.
    pub async fn run<S: EventSink>(
        mut self,
        mut stream: LogByteStream,
        sink: &mut S,
    ) -> SessionEnd {
        log::info!(
            "Log session {} started for container {}",
            self.id,
            self.container
        );

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => break SessionEnd::ClientDisconnected,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    let lines = self.framer.push(&chunk);
                    if self.emit(lines, sink).await.is_err() {
                        break SessionEnd::ClientDisconnected;
                    }
                }
                Some(Err(e)) => {
                    log::error!("Log session {} read error: {}", self.id, e);
                    break SessionEnd::ReadError(e);
                }
                None => {
                    let rest = self.framer.finish().into_iter().collect();
                    if self.emit(rest, sink).await.is_err() {
                        break SessionEnd::ClientDisconnected;
                    }
                    break SessionEnd::EndOfStream;
                }
            }
        };
        drop(stream);

        log::info!(
            "Log session {} for container {} ended ({:?}) after {} events",
            self.id,
            self.container,
            end,
            self.events_sent
        );
        end
    }

    async fn emit<S: EventSink>(
        &mut self,
        lines: Vec<String>,
        sink: &mut S,
    ) -> Result<(), SinkClosed> {
        for line in lines {
            sink.send(&line).await?;
            sink.flush().await?;
            self.events_sent += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Send(String),
        Flush,
    }

    /// Records every sink call; setting `disconnected` simulates the client leaving.
    #[derive(Default)]
    struct RecordingSink {
        ops: Vec<Op>,
        gone: Arc<Notify>,
        disconnected: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Send(line) => Some(line.clone()),
                    Op::Flush => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&mut self, line: &str) -> Result<(), SinkClosed> {
            if self.disconnected.load(Ordering::SeqCst) {
                return Err(SinkClosed);
            }
            self.ops.push(Op::Send(line.to_string()));
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), SinkClosed> {
            if self.disconnected.load(Ordering::SeqCst) {
                return Err(SinkClosed);
            }
            self.ops.push(Op::Flush);
            Ok(())
        }

        async fn closed(&self) {
            loop {
                let notified = self.gone.notified();
                if self.disconnected.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }

    /// Engine stream fed from a channel that counts polls and reports when dropped.
    struct CountingStream {
        rx: mpsc::Receiver<Result<Bytes, EngineError>>,
        polls: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    impl futures::Stream for CountingStream {
        type Item = Result<Bytes, EngineError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.rx.poll_recv(cx)
        }
    }

    impl Drop for CountingStream {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> LogByteStream {
        let items: Vec<Result<Bytes, EngineError>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part)))
            .collect();
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks_are_emitted_once() {
        let mut sink = RecordingSink::default();
        let stream = chunks(&[b"2024-01-01T00:00:00Z fir", b"st\nsec", b"ond\nthird\n"]);

        let end = LogSession::new("abc123").run(stream, &mut sink).await;

        assert_eq!(end, SessionEnd::EndOfStream);
        assert_eq!(
            sink.lines(),
            vec!["2024-01-01T00:00:00Z first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn test_every_event_is_flushed_immediately() {
        let mut sink = RecordingSink::default();
        let stream = chunks(&[b"a\nb\nc\n"]);

        LogSession::new("abc123").run(stream, &mut sink).await;

        assert_eq!(
            sink.ops,
            vec![
                Op::Send("a".to_string()),
                Op::Flush,
                Op::Send("b".to_string()),
                Op::Flush,
                Op::Send("c".to_string()),
                Op::Flush,
            ]
        );
    }

    #[tokio::test]
    async fn test_end_of_stream_emits_trailing_fragment() {
        let mut sink = RecordingSink::default();
        let stream = chunks(&[b"done\nno newline"]);

        let end = LogSession::new("abc123").run(stream, &mut sink).await;

        assert_eq!(end, SessionEnd::EndOfStream);
        assert_eq!(sink.lines(), vec!["done", "no newline"]);
    }

    #[tokio::test]
    async fn test_empty_stream_ends_cleanly() {
        let mut sink = RecordingSink::default();
        let end = LogSession::new("abc123").run(chunks(&[]), &mut sink).await;
        assert_eq!(end, SessionEnd::EndOfStream);
        assert!(sink.ops.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_ends_session_without_retry() {
        let mut sink = RecordingSink::default();
        let stream = stream::iter(vec![
            Ok(Bytes::from_static(b"before\n")),
            Err(EngineError::StreamRead("connection reset".to_string())),
            Ok(Bytes::from_static(b"after\n")),
        ])
        .boxed();

        let end = LogSession::new("abc123").run(stream, &mut sink).await;

        assert_eq!(
            end,
            SessionEnd::ReadError(EngineError::StreamRead("connection reset".to_string()))
        );
        assert_eq!(sink.lines(), vec!["before"]);
    }

    #[tokio::test]
    async fn test_disconnect_while_idle_releases_stream() {
        let (tx, rx) = mpsc::channel(4);
        let polls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let stream = CountingStream {
            rx,
            polls: Arc::clone(&polls),
            dropped: Arc::clone(&dropped),
        }
        .boxed();

        let mut sink = RecordingSink::default();
        let gone = Arc::clone(&sink.gone);
        let disconnected = Arc::clone(&sink.disconnected);

        let session = tokio::spawn(async move {
            let end = LogSession::new("abc123").run(stream, &mut sink).await;
            (end, sink)
        });

        tx.send(Ok(Bytes::from_static(b"hello\n"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The engine has nothing more to say; the client leaves.
        disconnected.store(true, Ordering::SeqCst);
        gone.notify_waiters();

        let (end, sink) = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session did not observe the disconnect")
            .unwrap();

        assert_eq!(end, SessionEnd::ClientDisconnected);
        assert_eq!(sink.lines(), vec!["hello"]);
        assert!(dropped.load(Ordering::SeqCst));

        let polls_after = polls.load(Ordering::SeqCst);
        let _ = tx.send(Ok(Bytes::from_static(b"ignored\n"))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(polls.load(Ordering::SeqCst), polls_after);
    }

    #[tokio::test]
    async fn test_client_already_gone_reads_nothing() {
        let polls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Bytes::from_static(b"one\ntwo\n"))).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"three\n"))).await.unwrap();
        let stream = CountingStream {
            rx,
            polls: Arc::clone(&polls),
            dropped: Arc::clone(&dropped),
        }
        .boxed();

        // Already gone before the first event can be written
        let mut sink = RecordingSink::default();
        sink.disconnected.store(true, Ordering::SeqCst);

        let end = LogSession::new("abc123").run(stream, &mut sink).await;

        assert_eq!(end, SessionEnd::ClientDisconnected);
        assert!(sink.ops.is_empty());
        assert_eq!(polls.load(Ordering::SeqCst), 0);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
