use minijinja::{Environment, context};
use serde::Serialize;

use crate::engine::{ContainerSummary, PublishedPort};

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../../templates/layout.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("rows.html", include_str!("../../templates/rows.html")),
    ("logs.html", include_str!("../../templates/logs.html")),
    ("container.html", include_str!("../../templates/container.html")),
];

const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// HTML views, compiled once at start-up.
///
/// Templates are embedded in the binary and auto-escaped since they all end
/// in `.html`.
pub struct Views {
    env: Environment<'static>,
}

#[derive(Debug, Serialize)]
struct ContainerRow<'a> {
    id: &'a str,
    short_id: &'a str,
    name: &'a str,
    image: &'a str,
    state: &'a str,
    active: bool,
    status: &'a str,
    created: String,
    ports: Vec<PortRow<'a>>,
}

#[derive(Debug, Serialize)]
struct PortRow<'a> {
    host: &'a str,
    port: u16,
    container_port: u16,
    protocol: &'a str,
}

impl<'a> From<&'a PublishedPort> for PortRow<'a> {
    fn from(p: &'a PublishedPort) -> Self {
        Self {
            host: &p.host,
            port: p.port,
            container_port: p.container_port,
            protocol: &p.protocol,
        }
    }
}

impl<'a> From<&'a ContainerSummary> for ContainerRow<'a> {
    fn from(c: &'a ContainerSummary) -> Self {
        Self {
            id: &c.id,
            short_id: c.short_id(),
            name: &c.name,
            image: &c.image,
            state: c.state.as_ref(),
            active: c.state.is_active(),
            status: &c.status,
            created: c
                .created
                .map(|t| t.format(CREATED_FORMAT).to_string())
                .unwrap_or_default(),
            ports: c.ports.iter().map(PortRow::from).collect(),
        }
    }
}

impl Views {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Full dashboard page.
    pub fn index(
        &self,
        containers: &[ContainerSummary],
        allow_actions: bool,
        grafana_url: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        let rows: Vec<ContainerRow> = containers.iter().map(ContainerRow::from).collect();
        self.env.get_template("index.html")?.render(context! {
            containers => rows,
            allow_actions,
            grafana_url,
        })
    }

    /// Only the table rows, swapped in by the periodic refresh.
    pub fn rows(
        &self,
        containers: &[ContainerSummary],
        allow_actions: bool,
    ) -> Result<String, minijinja::Error> {
        let rows: Vec<ContainerRow> = containers.iter().map(ContainerRow::from).collect();
        self.env.get_template("rows.html")?.render(context! {
            containers => rows,
            allow_actions,
        })
    }

    pub fn container(
        &self,
        container: &ContainerSummary,
        ui_href: Option<&str>,
        allow_actions: bool,
        grafana_url: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        self.env.get_template("container.html")?.render(context! {
            container => ContainerRow::from(container),
            ui_href,
            allow_actions,
            grafana_url,
        })
    }

    pub fn logs(&self, id: &str, grafana_url: Option<&str>) -> Result<String, minijinja::Error> {
        self.env
            .get_template("logs.html")?
            .render(context! { id, grafana_url })
    }
}
