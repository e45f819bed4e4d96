//! HTTP request handlers, organized by domain.

pub mod checkout;
pub mod events;
pub mod health;
pub mod tickets;
pub mod waitlist;

pub use health::{health_check, readiness_check};
