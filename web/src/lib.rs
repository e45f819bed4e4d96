//! HTTP surface for the box office.
//!
//! Handlers are a thin shell over [`boxoffice_core::BoxOffice`]: they parse
//! the request, pass the caller's identity along explicitly, and map the
//! result or [`boxoffice_core::BoxOfficeError`] to a response. No business
//! rule lives here.
//!
//! # Request Flow
//!
//! 1. **Request tracking** by [`middleware::track_request`]: correlation id
//!    and caller recorded on the request span
//! 2. **Caller** read from the `X-User-Id` header ([`extractors::Caller`])
//! 3. **Facade call** on the shared [`AppState`]
//! 4. **Error mapping** through [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use boxoffice_web::{AppState, routes::build_router};
//!
//! let app = build_router(AppState::new(office));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use extractors::{Caller, CorrelationId, USER_ID_HEADER};
pub use middleware::{CORRELATION_ID_HEADER, track_request};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
