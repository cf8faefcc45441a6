//! Docker implementation of the engine client using bollard.

use async_trait::async_trait;
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, ListContainersOptions,
    ListContainersOptionsBuilder, LogsOptions, LogsOptionsBuilder, RestartContainerOptions,
    RestartContainerOptionsBuilder, StartContainerOptions, StartContainerOptionsBuilder,
    StopContainerOptions, StopContainerOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use bytes::Bytes;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use std::time::Duration;

use super::{
    ContainerState, ContainerSummary, Engine, EngineError, LogByteStream, LogStreamOptions,
    PublishedPort, READ_CHUNK_SIZE,
};

/// Seconds bollard waits for the daemon before giving up on a request.
const CONNECT_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Engine client backed by a single long lived bollard connection.
///
/// `Docker` is internally reference counted, so one instance is shared by
/// every request handler.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the daemon at `host` and negotiate the API version.
    ///
    /// Accepts `unix:///path`, `tcp://host:port`, `http://host:port` or a
    /// bare socket path. An empty host falls back to bollard's local defaults.
    pub async fn connect(host: &str) -> Result<Self, EngineError> {
        let docker = connect_raw(host).map_err(|e| EngineError::Connection(e.to_string()))?;

        // Keep the default version if the daemon is not up yet; requests will
        // surface the connection error once it is actually needed.
        let docker = match docker.clone().negotiate_version().await {
            Ok(negotiated) => {
                log::info!("Negotiated Docker API version with {host}");
                negotiated
            }
            Err(e) => {
                log::warn!("Unable to negotiate Docker API version with {host}: {e}");
                docker
            }
        };

        Ok(Self { docker })
    }
}

fn connect_raw(host: &str) -> Result<Docker, bollard::errors::Error> {
    let host = host.trim();
    if host.is_empty() {
        return Docker::connect_with_local_defaults();
    }
    if let Some(path) = host.strip_prefix("unix://") {
        return Docker::connect_with_unix(path, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION);
    }
    if host.starts_with('/') {
        return Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION);
    }
    Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
}

/// Map a bollard error for a request that targets container `id`.
fn classify(id: &str, err: bollard::errors::Error) -> EngineError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => EngineError::NotFound(id.to_string()),
        bollard::errors::Error::DockerResponseServerError { message, .. } => {
            EngineError::Engine(message)
        }
        other => EngineError::Connection(other.to_string()),
    }
}

/// Split `chunk` into pieces of at most `max` bytes without copying.
pub(crate) fn split_chunk(mut chunk: Bytes, max: usize) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(chunk.len().div_ceil(max.max(1)));
    while chunk.len() > max {
        pieces.push(chunk.split_to(max));
    }
    if !chunk.is_empty() {
        pieces.push(chunk);
    }
    pieces
}

fn grace_secs(grace: Duration) -> i32 {
    i32::try_from(grace.as_secs()).unwrap_or(i32::MAX)
}

fn summary_from_model(model: bollard::models::ContainerSummary) -> ContainerSummary {
    let id = model.id.unwrap_or_default();
    // The API reports names with a leading slash ("/web")
    let name = model
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    let state = model
        .state
        .as_ref()
        .map(|s| ContainerState::from(s.to_string().as_str()))
        .unwrap_or(ContainerState::Unknown);

    ContainerSummary {
        id,
        name,
        image: model.image.unwrap_or_default(),
        state,
        status: model.status.unwrap_or_default(),
        created: model
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        ports: published_ports(model.ports.unwrap_or_default()),
    }
}

/// Keep only ports bound on the host. Docker reports a dual-stack binding
/// once per address family, the duplicates are dropped.
fn published_ports(ports: Vec<bollard::models::PortSummary>) -> Vec<PublishedPort> {
    let mut published: Vec<PublishedPort> = Vec::with_capacity(ports.len());
    for port in ports {
        let Some(public) = port.public_port else {
            continue;
        };
        let protocol = port
            .typ
            .map(|t| t.to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "tcp".to_string());
        if published
            .iter()
            .any(|p| p.port == public && p.protocol == protocol)
        {
            continue;
        }
        published.push(PublishedPort {
            host: port.ip.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: public,
            container_port: port.private_port,
            protocol,
        });
    }
    published
}

#[async_trait]
impl Engine for DockerEngine {
    async fn list(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        let options: ListContainersOptions = ListContainersOptionsBuilder::new()
            .all(include_stopped)
            .build();

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { message, .. } => {
                    EngineError::Engine(message)
                }
                other => EngineError::Connection(other.to_string()),
            })?;

        Ok(containers.into_iter().map(summary_from_model).collect())
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        let options: StartContainerOptions = StartContainerOptionsBuilder::new().build();

        match self.docker.start_container(id, Some(options)).await {
            Ok(_) => {
                log::info!("Container {id} started");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                log::info!("Container {id} already started");
                Ok(())
            }
            Err(e) => Err(classify(id, e)),
        }
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        let options: StopContainerOptions = StopContainerOptionsBuilder::new()
            .t(grace_secs(grace))
            .build();

        match self.docker.stop_container(id, Some(options)).await {
            Ok(_) => {
                log::info!("Container {id} stopped");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                log::info!("Container {id} already stopped");
                Ok(())
            }
            Err(e) => Err(classify(id, e)),
        }
    }

    async fn restart(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        let options: RestartContainerOptions = RestartContainerOptionsBuilder::new()
            .t(grace_secs(grace))
            .build();

        self.docker
            .restart_container(id, Some(options))
            .await
            .map_err(|e| classify(id, e))?;

        log::info!("Container {id} restarted");
        Ok(())
    }

    async fn open_log_stream(
        &self,
        id: &str,
        options: LogStreamOptions,
    ) -> Result<LogByteStream, EngineError> {
        // The logs endpoint only reports a missing container once the stream
        // is polled, after the response headers are already committed.
        let inspect: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();
        self.docker
            .inspect_container(id, Some(inspect))
            .await
            .map_err(|e| classify(id, e))?;

        let logs: LogsOptions = LogsOptionsBuilder::new()
            .follow(options.follow)
            .stdout(true)
            .stderr(true)
            .timestamps(options.timestamps)
            .tail(&options.tail_param())
            .build();

        // bollard strips the multiplexing headers, only payloads come through
        let stream = self
            .docker
            .logs(id, Some(logs))
            .map(|item| match item {
                Ok(output) => stream::iter(
                    split_chunk(output.into_bytes(), READ_CHUNK_SIZE)
                        .into_iter()
                        .map(Ok)
                        .collect::<Vec<_>>(),
                ),
                Err(e) => stream::iter(vec![Err(EngineError::StreamRead(e.to_string()))]),
            })
            .flatten()
            .boxed();

        Ok(stream)
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Connection(e.to_string()))
    }
}
