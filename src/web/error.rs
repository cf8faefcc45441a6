use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Templating error: {0}")]
    Render(#[from] minijinja::Error),
    #[error("404 page not found")]
    NotFound,
    #[error("Actions disabled")]
    ActionsDisabled,
    #[error("Missing bearer token")]
    Unauthorized,
    #[error("Invalid token")]
    Forbidden,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(EngineError::NotFound(_)) | Self::NotFound => StatusCode::NOT_FOUND,
            Self::Engine(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ActionsDisabled | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("Request failed: {self}");
        }
        // The daemon's own message is the most useful thing to show
        let message = match self {
            Self::Engine(EngineError::Engine(message)) => message,
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
