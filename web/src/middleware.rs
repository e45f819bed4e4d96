//! Request tracking middleware.
//!
//! [`track_request`] runs every request inside an `http_request` span with
//! structured fields for the correlation id, the calling user and the final
//! status. The correlation id is taken from the `X-Correlation-ID` header
//! when it parses as a UUID and generated otherwise; it is stored in request
//! extensions for [`crate::extractors::CorrelationId`] and echoed on the
//! response so a buyer's support request can be matched to server logs.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn};
//! use boxoffice_web::middleware::track_request;
//!
//! let app = Router::new()
//!     .route("/api/tickets", get(list_tickets))
//!     .layer(from_fn(track_request));
//! ```

use crate::extractors::USER_ID_HEADER;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{Instrument, field};
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Requests slower than this are logged at warn level.
const SLOW_REQUEST_MS: u64 = 1_000;

/// Tags the request with a correlation id and logs its outcome.
pub async fn track_request(mut request: Request, next: Next) -> Response {
    let correlation_id = incoming_correlation_id(request.headers()).unwrap_or_else(Uuid::new_v4);
    request.extensions_mut().insert(correlation_id);

    let span = tracing::info_span!(
        "http_request",
        %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
        caller = field::Empty,
        status = field::Empty,
    );
    if let Some(caller) = caller(request.headers()) {
        span.record("caller", caller);
    }

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let status = response.status();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    span.record("status", status.as_u16());

    span.in_scope(|| {
        if status.is_server_error() {
            tracing::warn!(elapsed_ms, "Request failed");
        } else if elapsed_ms > SLOW_REQUEST_MS {
            tracing::warn!(elapsed_ms, "Slow request");
        } else {
            tracing::debug!(elapsed_ms, "Request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

fn incoming_correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

fn caller(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
