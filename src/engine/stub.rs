//! In-memory engine used by the handler and session tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{
    ContainerState, ContainerSummary, Engine, EngineError, LogByteStream, LogStreamOptions,
};

pub struct StubEngine {
    containers: Mutex<Vec<ContainerSummary>>,
    logs: Mutex<HashMap<String, Vec<Bytes>>>,
    live: Mutex<HashMap<String, mpsc::Receiver<Result<Bytes, EngineError>>>>,
    log_requests: Mutex<Vec<(String, LogStreamOptions)>>,
    stop_requests: Mutex<Vec<(String, Duration)>>,
    reachable: AtomicBool,
}

pub fn container(id: &str, name: &str, state: ContainerState) -> ContainerSummary {
    ContainerSummary {
        id: id.to_string(),
        name: name.to_string(),
        image: format!("{name}:latest"),
        state,
        status: state.to_string(),
        created: None,
        ports: Vec::new(),
    }
}

impl StubEngine {
    pub fn new(containers: Vec<ContainerSummary>) -> Self {
        Self {
            containers: Mutex::new(containers),
            logs: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            log_requests: Mutex::new(Vec::new()),
            stop_requests: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Serve `chunks` then end the stream when logs for `id` are opened.
    pub fn with_logs(self, id: &str, chunks: &[&'static [u8]]) -> Self {
        self.logs.lock().unwrap().insert(
            id.to_string(),
            chunks.iter().map(|c| Bytes::from_static(c)).collect(),
        );
        self
    }

    /// Serve whatever gets pushed into the returned sender.
    pub fn live_logs(&self, id: &str) -> mpsc::Sender<Result<Bytes, EngineError>> {
        let (tx, rx) = mpsc::channel(16);
        self.live.lock().unwrap().insert(id.to_string(), rx);
        tx
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn state_of(&self, id: &str) -> Option<ContainerState> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.state)
    }

    pub fn snapshot(&self) -> Vec<ContainerSummary> {
        self.containers.lock().unwrap().clone()
    }

    pub fn log_requests(&self) -> Vec<(String, LogStreamOptions)> {
        self.log_requests.lock().unwrap().clone()
    }

    pub fn stop_requests(&self) -> Vec<(String, Duration)> {
        self.stop_requests.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), EngineError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Connection("connection refused".to_string()))
        }
    }

    fn transition(&self, id: &str, state: ContainerState) -> Result<(), EngineError> {
        self.check_reachable()?;
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| c.id == id || c.name == id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        container.state = state;
        container.status = state.to_string();
        Ok(())
    }

    fn exists(&self, id: &str) -> bool {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id == id || c.name == id)
    }
}

#[async_trait]
impl Engine for StubEngine {
    async fn list(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>, EngineError> {
        self.check_reachable()?;
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| include_stopped || c.state.is_active())
            .cloned()
            .collect())
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.transition(id, ContainerState::Running)
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<(), EngineError> {
        self.stop_requests
            .lock()
            .unwrap()
            .push((id.to_string(), grace));
        self.transition(id, ContainerState::Exited)
    }

    async fn restart(&self, id: &str, _grace: Duration) -> Result<(), EngineError> {
        self.transition(id, ContainerState::Running)
    }

    async fn open_log_stream(
        &self,
        id: &str,
        options: LogStreamOptions,
    ) -> Result<LogByteStream, EngineError> {
        self.check_reachable()?;
        if !self.exists(id) {
            return Err(EngineError::NotFound(id.to_string()));
        }
        self.log_requests
            .lock()
            .unwrap()
            .push((id.to_string(), options));

        if let Some(rx) = self.live.lock().unwrap().remove(id) {
            let stream = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });
            return Ok(stream.boxed());
        }

        let chunks = self
            .logs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.check_reachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> StubEngine {
        StubEngine::new(vec![
            container("abc123", "web", ContainerState::Running),
            container("def456", "db", ContainerState::Exited),
            container("0a0b0c", "cache", ContainerState::Paused),
        ])
    }

    #[tokio::test]
    async fn test_list_preserves_engine_order_and_states() {
        let engine = fixture();
        let listed = engine.list(true).await.unwrap();

        assert_eq!(listed.len(), 3);
        assert_eq!(
            listed.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["abc123", "def456", "0a0b0c"]
        );
        assert_eq!(
            listed.iter().map(|c| c.state).collect::<Vec<_>>(),
            vec![
                ContainerState::Running,
                ContainerState::Exited,
                ContainerState::Paused
            ]
        );
    }

    #[tokio::test]
    async fn test_list_without_stopped() {
        let engine = fixture();
        let listed = engine.list(false).await.unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["abc123", "0a0b0c"]
        );
    }

    #[tokio::test]
    async fn test_actions_on_unknown_id_do_not_mutate() {
        let engine = fixture();
        let before = engine.snapshot();

        for result in [
            engine.start("nope").await,
            engine.stop("nope", Duration::from_secs(10)).await,
            engine.restart("nope", Duration::from_secs(10)).await,
        ] {
            assert_eq!(result, Err(EngineError::NotFound("nope".to_string())));
        }

        assert_eq!(engine.snapshot(), before);
    }

    #[tokio::test]
    async fn test_stop_transitions_to_stopped() {
        let engine = fixture();
        engine.stop("abc123", Duration::from_secs(10)).await.unwrap();
        assert_eq!(engine.state_of("abc123"), Some(ContainerState::Exited));
    }

    #[tokio::test]
    async fn test_unreachable_engine() {
        let engine = fixture();
        engine.set_reachable(false);
        assert!(matches!(
            engine.list(true).await,
            Err(EngineError::Connection(_))
        ));
        assert!(matches!(engine.ping().await, Err(EngineError::Connection(_))));
    }
}
