use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::TargetState;

const VISUALIZATION_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Service Metrics</title>
    <script>
        function reload() {
            fetch('/metrics').then(res => res.text()).then(data => {
                document.getElementById('metrics').innerText = data;
            });
            setTimeout(reload, 5000);
        }
        window.onload = reload;
    </script>
</head>
<body>
    <h1>Service Metrics</h1>
    <pre id="metrics">Loading metrics...</pre>
</body>
</html>
"#;

/// Known routes. Anything else is served by the root handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Root,
    Status,
    Metrics,
    Visualization,
}

impl Route {
    pub fn resolve(path: &str) -> Self {
        match path {
            "/status" => Route::Status,
            "/metrics" => Route::Metrics,
            "/visualization" => Route::Visualization,
            _ => Route::Root,
        }
    }

    /// Path label recorded in metrics.
    ///
    /// This is the matched route, not the raw request path: `/foo` and `/bar`
    /// are both served by the root handler and are both recorded as `/`, so
    /// arbitrary URLs cannot grow the label set.
    pub fn label(&self) -> &'static str {
        match self {
            Route::Root => "/",
            Route::Status => "/status",
            Route::Metrics => "/metrics",
            Route::Visualization => "/visualization",
        }
    }
}

/// Entry point for every request: times the route handler and records it.
///
/// The request body is read to the end before the clock starts. Upload time
/// depends on the client and the network, and must not count against the
/// latency threshold.
pub async fn handle(
    req: Request<Body>,
    state: Arc<TargetState>,
) -> Result<Response<Body>, Infallible> {
    let route = Route::resolve(req.uri().path());
    let method = req.method().clone();
    drain(req.into_body()).await;

    let start = Instant::now();
    let response = dispatch(route, &state);

    state.record(route.label(), method.as_str(), response.status(), start.elapsed());
    Ok(response)
}

fn dispatch(route: Route, state: &TargetState) -> Response<Body> {
    match route {
        Route::Root => text(StatusCode::OK, "Hello, World!"),
        Route::Status => text(StatusCode::OK, state.status.text()),
        Route::Metrics => {
            let mut response = Response::new(Body::from(state.metrics.encode()));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Route::Visualization => {
            let mut response = Response::new(Body::from(VISUALIZATION_PAGE));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response
        }
    }
}

/// Reads an upload to the end so the connection can be kept alive. Chunks are
/// dropped as they arrive.
async fn drain(mut body: Body) {
    let mut received: u64 = 0;
    while let Some(chunk) = body.data().await {
        match chunk {
            Ok(bytes) => received += bytes.len() as u64,
            Err(e) => {
                warn!(error = %e, received_bytes = received, "Request body ended early");
                return;
            }
        }
    }
    if received > 0 {
        debug!(received_bytes = received, "Request body drained");
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
