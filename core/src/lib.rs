//! # Boxoffice Core
//!
//! Reservation lifecycle for scarce, perishable event inventory.
//!
//! A buyer joins an event's waiting list, is promoted to a time-boxed purchase
//! offer when capacity allows, pays through an external processor, and later
//! redeems the issued tickets exactly once at the door.
//!
//! # Architecture
//!
//! ```text
//!   join / promote / release      checkout           payment event       scan
//!            │                        │                     │                │
//!            ▼                        ▼                     ▼                ▼
//!   ┌─────────────────┐   ┌──────────────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ WaitlistReducer │   │ CheckoutOrchestrator │   │  Reconciler  │   │CheckInReducer│
//!   └────────┬────────┘   │    (fees::settle)    │   │  (Issuance)  │   └──────┬───────┘
//!            │            └──────────┬───────────┘   └──────┬───────┘          │
//!            │                read-only snapshot            │                  │
//!            └───────────────────────┬──────────────────────┴──────────────────┘
//!                                    ▼
//!                        ┌───────────────────────┐
//!                        │   LedgerRepository    │  load → reduce → append
//!                        │  (optimistic retry)   │  (expected version)
//!                        └───────────┬───────────┘
//!                                    ▼
//!                        ┌───────────────────────┐
//!                        │      LedgerStore      │  per-event event stream +
//!                        │                       │  unique payment references
//!                        └───────────────────────┘
//! ```
//!
//! Every inventory-affecting transition runs as a reducer against a freshly
//! loaded [`ledger::EventLedger`] and is committed with an expected stream
//! version, so concurrent writers on the same event serialize through the
//! store rather than through in-process locks.
//!
//! Offer expiry is never scheduled: an offer is expired whenever
//! `now >= offer_expires_at`, evaluated at every read and write boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod checkout;
pub mod config;
pub mod environment;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod payment_processor;
pub mod reconciliation;
pub mod reducer;
pub mod scan;
pub mod service;
pub mod store;
pub mod types;

pub use aggregates::{CheckInOutcome, CheckInReducer, IssuanceReducer, WaitlistReducer};
pub use config::Config;
pub use environment::{Clock, SystemClock};
pub use error::{BoxOfficeError, ErrorKind};
pub use fees::{ChargeBreakdown, FeeSchedule};
pub use ledger::{EventLedger, LedgerEvent};
pub use service::BoxOffice;
pub use types::*;
