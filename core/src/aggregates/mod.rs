//! Reducers over an event's ledger.
//!
//! - Event: creation and cancellation
//! - Waitlist: join, promotion, expiry, release of offers
//! - Issuance: turning a settled payment into tickets, exactly once
//! - Check-in: redeeming a ticket at the door

pub mod checkin;
pub mod event;
pub mod issuance;
pub mod waitlist;

pub use checkin::{CheckInAction, CheckInOutcome, CheckInReducer};
pub use event::{EventAction, EventError, EventReducer, NewEvent};
pub use issuance::{IssuanceError, IssuanceReducer, IssueTickets, ReconcileOutcome};
pub use waitlist::{WaitlistAction, WaitlistError, WaitlistOutput, WaitlistReducer};
