//! Application state for Axum handlers.

use boxoffice_core::BoxOffice;

/// Application state shared across all HTTP handlers.
///
/// `BoxOffice` is a cheap handle over shared collaborators, so cloning the
/// state per request is fine.
#[derive(Clone)]
pub struct AppState {
    /// The box office facade
    pub office: BoxOffice,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(office: BoxOffice) -> Self {
        Self { office }
    }
}
