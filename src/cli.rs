use clap::Parser;

use crate::engine::docker::DEFAULT_DOCKER_HOST;

/// Web dashboard to list, control and tail the logs of Docker containers.
///
/// Every option can also be set through the environment variable shown
/// next to it.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Docker daemon endpoint (unix socket or tcp address).
    #[arg(long, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    pub docker_host: String,

    /// Address the dashboard listens on. A bare `:port` listens on all interfaces.
    #[arg(long, env = "ADDR", default_value = ":8088")]
    pub addr: String,

    /// Optional Grafana Explore URL linked from the dashboard.
    #[arg(long, env = "GRAFANA_URL")]
    pub grafana_url: Option<String>,

    /// Allow start/stop/restart from the dashboard.
    #[arg(
        long,
        env = "ALLOW_ACTIONS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub allow_actions: bool,

    /// Require `Authorization: Bearer <token>` on every page.
    #[arg(long = "token", env = "DASHBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds a container gets to exit on stop/restart before it is killed.
    #[arg(long, env = "STOP_GRACE_SECS", default_value_t = 10)]
    pub stop_grace_secs: u64,

    /// Existing log lines replayed when a live stream starts.
    #[arg(long, env = "LOG_TAIL", default_value_t = 100)]
    pub log_tail: usize,

    /// Host ports tried first when linking to a container's web UI.
    #[arg(
        long,
        env = "HTTP_PORT_HINTS",
        value_delimiter = ',',
        default_value = "8080,3000,80,5000,8000,8888,9090"
    )]
    pub http_port_hints: Vec<u16>,
}
