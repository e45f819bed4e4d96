//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation id
//! - `Caller`: the authenticated user from the `X-User-Id` header
//!
//! Identity is established upstream by the auth provider; this service
//! trusts the header it forwards.
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     State(state): State<AppState>,
//!     correlation_id: CorrelationId,
//!     caller: Caller,
//! ) -> Result<Json<Vec<Ticket>>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, user = %caller.0, "Listing tickets");
//!     Ok(Json(state.office.list_user_tickets(&caller.buyer()).await?))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use boxoffice_core::types::{BuyerId, SellerId};
use uuid::Uuid;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Correlation ID for request tracing.
///
/// Prefers the id assigned by [`crate::middleware::track_request`],
/// then the `X-Correlation-ID` header, and generates a UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The signed-in user making the request.
///
/// The same user id acts as a buyer on purchase routes and as a seller on
/// event management routes.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl Caller {
    /// The caller acting as a buyer
    #[must_use]
    pub fn buyer(&self) -> BuyerId {
        BuyerId::new(self.0.clone())
    }

    /// The caller acting as a seller
    #[must_use]
    pub fn seller(&self) -> SellerId {
        SellerId::new(self.0.clone())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
            .ok_or_else(|| AppError::unauthorized("sign in required"))
    }
}
