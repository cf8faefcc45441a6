use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use bytes::BytesMut;
use futures::StreamExt;
use http::uri::Authority;
use http::{HeaderMap, StatusCode, header};
use serde::Deserialize;

use super::AppState;
use super::error::AppError;
use crate::engine::{ContainerAction, LogStreamOptions, PublishedPort};
use crate::stream::spawn_session;

/// Lines returned by the plain-text log snapshot when no tail is given.
const DEFAULT_RAW_TAIL: usize = 200;

/// Most lines a plain-text snapshot will hold in memory.
const MAX_RAW_TAIL: usize = 10_000;

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let containers = state.engine.list(true).await?;
    let html = state.views.index(
        &containers,
        state.config.allow_actions,
        state.grafana_url(),
    )?;
    Ok(Html(html))
}

pub async fn rows_partial(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let containers = state.engine.list(true).await?;
    let html = state.views.rows(&containers, state.config.allow_actions)?;
    Ok(Html(html))
}

/// `POST /containers/{id}/{start|stop|restart}`
pub async fn container_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let action: ContainerAction = action.parse().map_err(|_| AppError::NotFound)?;
    if !state.config.allow_actions {
        return Err(AppError::ActionsDisabled);
    }

    log::debug!("Applying {} to container {}", action.as_ref(), id);
    state
        .engine
        .apply(&id, action, state.config.stop_grace)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Detail page of one container, with its published ports and a best-effort
/// link to the web UI it serves.
pub async fn container_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Html<String>, AppError> {
    let container = state.engine.find(&id).await?;
    let ui_href = container
        .ui_port(&state.config.http_port_hints)
        .map(|port| ui_href(headers.get(header::HOST).and_then(|h| h.to_str().ok()), port));

    let html = state.views.container(
        &container,
        ui_href.as_deref(),
        state.config.allow_actions,
        state.grafana_url(),
    )?;
    Ok(Html(html))
}

/// Link to `port` on the host the dashboard was reached through, so the link
/// also works behind a reverse proxy. Falls back to the binding address.
fn ui_href(host_header: Option<&str>, port: &PublishedPort) -> String {
    let host = host_header
        .and_then(|h| h.parse::<Authority>().ok())
        .map(|authority| authority.host().to_string())
        .unwrap_or_else(|| match port.host.as_str() {
            "" | "0.0.0.0" | "::" => "localhost".to_string(),
            v6 if v6.contains(':') => format!("[{v6}]"),
            other => other.to_string(),
        });
    format!("http://{host}:{}", port.port)
}

pub async fn logs_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    Ok(Html(state.views.logs(&id, state.grafana_url())?))
}

/// Server-sent events carrying the container's log lines as they are written.
pub async fn logs_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let logs = state
        .engine
        .open_log_stream(&id, LogStreamOptions::live(state.config.log_tail))
        .await?;

    let events = Sse::new(spawn_session(id, logs)).keep_alive(KeepAlive::default());
    // Stop nginx and friends from buffering the stream
    Ok((
        [(header::HeaderName::from_static("x-accel-buffering"), "no")],
        events,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct RawLogsQuery {
    tail: Option<usize>,
}

/// Plain-text snapshot of the last lines of a container's log.
pub async fn logs_raw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RawLogsQuery>,
) -> Result<Response, AppError> {
    let tail = query.tail.unwrap_or(DEFAULT_RAW_TAIL).min(MAX_RAW_TAIL);
    let mut logs = state
        .engine
        .open_log_stream(&id, LogStreamOptions::snapshot(tail))
        .await?;

    let mut text = BytesMut::new();
    while let Some(chunk) = logs.next().await {
        text.extend_from_slice(&chunk?);
    }

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        String::from_utf8_lossy(&text).into_owned(),
    )
        .into_response())
}

pub async fn healthz(State(state): State<AppState>) -> Response {
    match state.engine.ping().await {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => {
            log::warn!("Health check failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn static_asset(Path(file): Path<String>) -> Result<Response, AppError> {
    let (content_type, body) = match file.as_str() {
        "app.css" => ("text/css; charset=utf-8", include_str!("../../static/app.css")),
        "app.js" => (
            "text/javascript; charset=utf-8",
            include_str!("../../static/app.js"),
        ),
        _ => return Err(AppError::NotFound),
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        body,
    )
        .into_response())
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
