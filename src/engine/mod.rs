//! Engine client.
//!
//! A thin facade over the container engine API. Handlers only ever talk to
//! the [`Engine`] trait so the HTTP surface can be exercised against an
//! in-memory engine in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::time::Duration;

pub mod docker;
#[cfg(test)]
pub mod stub;
pub mod types;

pub use docker::DockerEngine;
pub use types::{
    ContainerAction, ContainerState, ContainerSummary, DEFAULT_HTTP_PORT_HINTS, DEFAULT_STOP_GRACE,
    LogStreamOptions, PublishedPort, READ_CHUNK_SIZE,
};

/// Demultiplexed log bytes, stdout and stderr interleaved in arrival order.
pub type LogByteStream = BoxStream<'static, Result<Bytes, EngineError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Unable to reach container engine: {0}")]
    Connection(String),
    #[error("No such container: {0}")]
    NotFound(String),
    #[error("Container engine error: {0}")]
    Engine(String),
    #[error("Log stream read failed: {0}")]
    StreamRead(String),
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Containers in the order the engine reports them.
    async fn list(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>, EngineError>;

    async fn start(&self, id: &str) -> Result<(), EngineError>;

    async fn stop(&self, id: &str, grace: Duration) -> Result<(), EngineError>;

    async fn restart(&self, id: &str, grace: Duration) -> Result<(), EngineError>;

    /// Open the log stream of a container. Fails with [`EngineError::NotFound`]
    /// before producing any bytes if the container does not exist.
    async fn open_log_stream(
        &self,
        id: &str,
        options: LogStreamOptions,
    ) -> Result<LogByteStream, EngineError>;

    async fn ping(&self) -> Result<(), EngineError>;

    /// Look up one container by id, id prefix or name.
    async fn find(&self, key: &str) -> Result<ContainerSummary, EngineError> {
        self.list(true)
            .await?
            .into_iter()
            .find(|c| c.matches(key))
            .ok_or_else(|| EngineError::NotFound(key.to_string()))
    }

    async fn apply(
        &self,
        id: &str,
        action: ContainerAction,
        grace: Duration,
    ) -> Result<(), EngineError> {
        match action {
            ContainerAction::Start => self.start(id).await,
            ContainerAction::Stop => self.stop(id, grace).await,
            ContainerAction::Restart => self.restart(id, grace).await,
        }
    }
}
