use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::HeaderValue;
use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use url::form_urlencoded;

use super::AppState;
use super::error::AppError;

/// Cookie that carries the dashboard token for browser requests.
pub const TOKEN_COOKIE: &str = "dockhand_token";

/// Query parameter that logs a browser in, e.g. `/?token=...`.
const TOKEN_PARAM: &str = "token";

/// Where a request got its token from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Presented {
    Header(String),
    Cookie(String),
    Query(String),
}

impl Presented {
    fn token(&self) -> &str {
        match self {
            Self::Header(t) | Self::Cookie(t) | Self::Query(t) => t,
        }
    }
}

/// Require the dashboard token when one is configured.
///
/// API clients send `Authorization: Bearer <token>`. Browsers cannot attach
/// that header to page loads, htmx polls or `EventSource`, so opening any
/// page once with `?token=<token>` stores the token in an HttpOnly cookie
/// that every later same-origin request carries.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = presented_token(&request).ok_or(AppError::Unauthorized)?;
    if presented.token() != expected {
        log::debug!("Rejected request to {} with invalid token", request.uri());
        return Err(AppError::Forbidden);
    }

    let mut response = next.run(request).await;
    if matches!(presented, Presented::Query(_)) {
        if let Ok(cookie) = HeaderValue::from_str(&session_cookie(expected)) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    Ok(response)
}

fn presented_token(request: &Request) -> Option<Presented> {
    let headers = request.headers();

    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
    {
        return Some(Presented::Header(token.to_string()));
    }

    if let Some(token) = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(cookie_token)
    {
        return Some(Presented::Cookie(token));
    }

    request
        .uri()
        .query()
        .and_then(query_token)
        .map(Presented::Query)
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Token from a `Cookie` header. The value is form-encoded when set.
fn cookie_token(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .and_then(|(_, value)| decode_value(value))
}

fn query_token(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

fn decode_value(value: &str) -> Option<String> {
    form_urlencoded::parse(format!("v={value}").as_bytes())
        .next()
        .map(|(_, decoded)| decoded.into_owned())
        .filter(|token| !token.is_empty())
}

fn session_cookie(token: &str) -> String {
    let value: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
    format!("{TOKEN_COOKIE}={value}; Path=/; HttpOnly; SameSite=Strict")
}
