//! Request metrics in the Prometheus text format, served on `/metrics`.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Instant;

use super::AppState;

/// Upper bounds of the latency histogram, in seconds.
const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Label used for requests that matched no route.
const UNMATCHED: &str = "none";

#[derive(Debug, Default)]
struct Histogram {
    buckets: [u64; DURATION_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, secs: f64) {
        for (bucket, bound) in self.buckets.iter_mut().zip(DURATION_BUCKETS) {
            if secs <= bound {
                *bucket += 1;
            }
        }
        self.sum += secs;
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct Counters {
    /// (handler, method, status class) -> requests
    requests: BTreeMap<(String, String, String), u64>,
    /// (handler, method) -> time to response headers
    durations: BTreeMap<(String, String), Histogram>,
}

/// Request counters shared by every handler.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    inner: Mutex<Counters>,
}

impl RequestMetrics {
    pub fn record(&self, handler: &str, method: &str, status: u16, secs: f64) {
        let class = format!("{}xx", status / 100);
        let Ok(mut counters) = self.inner.lock() else {
            return;
        };
        *counters
            .requests
            .entry((handler.to_string(), method.to_string(), class))
            .or_default() += 1;
        counters
            .durations
            .entry((handler.to_string(), method.to_string()))
            .or_default()
            .observe(secs);
    }

    /// Render every series in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let Ok(counters) = self.inner.lock() else {
            return out;
        };

        out.push_str("# HELP http_requests_total Total number of requests by method, status and handler.\n");
        out.push_str("# TYPE http_requests_total counter\n");
        for ((handler, method, status), count) in &counters.requests {
            let _ = writeln!(
                out,
                "http_requests_total{{handler=\"{}\",method=\"{}\",status=\"{}\"}} {count}",
                escape(handler),
                escape(method),
                status,
            );
        }

        out.push_str("# HELP http_request_duration_seconds Latency until response headers, by handler.\n");
        out.push_str("# TYPE http_request_duration_seconds histogram\n");
        for ((handler, method), histogram) in &counters.durations {
            let labels = format!("handler=\"{}\",method=\"{}\"", escape(handler), escape(method));
            for (bound, count) in DURATION_BUCKETS.iter().zip(histogram.buckets) {
                let _ = writeln!(
                    out,
                    "http_request_duration_seconds_bucket{{{labels},le=\"{bound}\"}} {count}"
                );
            }
            let _ = writeln!(
                out,
                "http_request_duration_seconds_bucket{{{labels},le=\"+Inf\"}} {}",
                histogram.count
            );
            let _ = writeln!(
                out,
                "http_request_duration_seconds_sum{{{labels}}} {}",
                histogram.sum
            );
            let _ = writeln!(
                out,
                "http_request_duration_seconds_count{{{labels}}} {}",
                histogram.count
            );
        }
        out
    }
}

fn escape(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Count the request and time it until the response headers are ready.
pub async fn track(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string());
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    state.metrics.record(
        &handler,
        &method,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
        .into_response()
}
