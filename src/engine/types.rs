use chrono::{DateTime, Utc};
use std::time::Duration;

/// Number of bytes handed to the log stream adapter per read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Grace period given to a container before the daemon kills it.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Host ports that most likely serve a web UI, in order of preference.
pub const DEFAULT_HTTP_PORT_HINTS: [u16; 7] = [8080, 3000, 80, 5000, 8000, 8888, 9090];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    // Anything the daemon reports that we don't know about
    Unknown,
}

impl AsRef<str> for ContainerState {
    fn as_ref(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl From<&str> for ContainerState {
    fn from(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

impl ContainerState {
    /// Whether the container currently has a live process.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Restarting | Self::Paused)
    }
}

/// One row of the container list, read fresh from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Human readable status as reported by the engine ("Up 3 minutes").
    pub status: String,
    pub created: Option<DateTime<Utc>>,
    /// Ports bound on the host, unpublished ports are left out.
    pub ports: Vec<PublishedPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    /// Host address the port is bound to.
    pub host: String,
    pub port: u16,
    pub container_port: u16,
    pub protocol: String,
}

impl ContainerSummary {
    /// The first twelve characters of the id, the way the docker CLI shows it.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map_or(self.id.len(), |(idx, _)| idx);
        &self.id[..end]
    }

    /// Whether `key` names this container: its full id, an id prefix of at
    /// least four characters, or its name.
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.name == key || (key.len() >= 4 && self.id.starts_with(key))
    }

    /// Best guess at the published port serving a web UI. Hinted ports win
    /// in hint order, otherwise the first published port.
    pub fn ui_port(&self, hints: &[u16]) -> Option<&PublishedPort> {
        hints
            .iter()
            .find_map(|hint| self.ports.iter().find(|p| p.port == *hint))
            .or_else(|| self.ports.first())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamOptions {
    pub follow: bool,
    /// Number of existing lines to replay before following. `None` replays everything.
    pub tail: Option<usize>,
    pub timestamps: bool,
}

impl LogStreamOptions {
    /// Options used by the live log view: replay `tail` lines then keep following.
    pub fn live(tail: usize) -> Self {
        Self {
            follow: true,
            tail: Some(tail),
            timestamps: true,
        }
    }

    /// Options for a one-shot snapshot of the last `tail` lines.
    pub fn snapshot(tail: usize) -> Self {
        Self {
            follow: false,
            tail: Some(tail),
            timestamps: false,
        }
    }

    pub(crate) fn tail_param(&self) -> String {
        match self.tail {
            Some(n) => n.to_string(),
            None => "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl std::str::FromStr for ContainerAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            _ => Err(()),
        }
    }
}

impl AsRef<str> for ContainerAction {
    fn as_ref(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}
