//! Liveness endpoint.
//!
//! `/health` answers `200 OK` with `{"alive":true}` for every method, any other
//! path is `404 Not Found`.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use tracing::error;

/// Path the liveness endpoint is registered on.
pub const HEALTH_PATH: &str = "/health";

/// Body of the liveness response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub alive: bool,
}

/// Hyper service function, never fails.
pub async fn respond<B>(request: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(&request))
}

/// Maps a request to its response, the body of the request is never read.
pub fn route<B>(request: &Request<B>) -> Response<Full<Bytes>> {
    if request.uri().path() == HEALTH_PATH {
        json(&HealthResponse { alive: true })
    } else {
        not_found()
    }
}

fn json<T: Serialize>(value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            let mut response = Response::new(Full::default());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn not_found() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"404 page not found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
