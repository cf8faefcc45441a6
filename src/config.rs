use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use url::Url;

use crate::cli::Args;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid listen address {0:?}: {1}")]
    Addr(String, std::net::AddrParseError),
    #[error("Invalid GRAFANA_URL {0:?}: {1}")]
    GrafanaUrl(String, url::ParseError),
    #[error("DASHBOARD_TOKEN must not be empty")]
    EmptyToken,
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub docker_host: String,
    pub listen: SocketAddr,
    pub grafana_url: Option<Url>,
    pub allow_actions: bool,
    pub token: Option<String>,
    pub stop_grace: Duration,
    pub log_tail: usize,
    pub http_port_hints: Vec<u16>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            docker_host: crate::engine::docker::DEFAULT_DOCKER_HOST.to_string(),
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8088),
            grafana_url: None,
            allow_actions: true,
            token: None,
            stop_grace: crate::engine::DEFAULT_STOP_GRACE,
            log_tail: 100,
            http_port_hints: crate::engine::DEFAULT_HTTP_PORT_HINTS.to_vec(),
        }
    }
}

impl TryFrom<Args> for DashboardConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let listen = parse_listen_addr(&args.addr)?;

        let grafana_url = match args.grafana_url.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                Some(Url::parse(raw).map_err(|e| ConfigError::GrafanaUrl(raw.to_string(), e))?)
            }
        };

        let token = match args.token {
            Some(token) if token.trim().is_empty() => return Err(ConfigError::EmptyToken),
            other => other,
        };

        Ok(Self {
            docker_host: args.docker_host,
            listen,
            grafana_url,
            allow_actions: args.allow_actions,
            token,
            stop_grace: Duration::from_secs(args.stop_grace_secs),
            log_tail: args.log_tail,
            http_port_hints: args.http_port_hints,
        })
    }
}

/// Parse a listen address, accepting the `:8088` shorthand for all interfaces.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let addr = addr.trim();
    let full = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };
    full.parse()
        .map_err(|e| ConfigError::Addr(addr.to_string(), e))
}
