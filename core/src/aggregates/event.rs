//! Event lifecycle: creation and cancellation.
//!
//! Price and capacity are fixed at creation. Cancellation is monotonic and
//! voids every ticket that has not been used yet.

use crate::error::ErrorKind;
use crate::ledger::{EventLedger, LedgerEvent};
use crate::reducer::{LedgerEnvironment, Recorder, Reduced, Reducer};
use crate::types::{Event, EventId, Money, SellerId};
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Actions
// ============================================================================

/// Details supplied by a seller creating an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    /// Display name
    pub name: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Price of one admission
    pub unit_price: Money,
    /// Admissions for sale
    pub total_capacity: u32,
    /// Seller's connected processor account
    pub payout_account: Option<String>,
}

/// Actions for the event lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventAction {
    /// Create the event this stream belongs to
    Create {
        /// Stream id chosen by the caller
        event_id: EventId,
        /// Owning seller
        seller_id: SellerId,
        /// Event details
        details: NewEvent,
    },
    /// Cancel the event
    Cancel {
        /// Caller, must own the event
        seller_id: SellerId,
    },
}

/// Event lifecycle rejections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Stream already holds an event
    #[error("event {0} already exists")]
    AlreadyExists(EventId),

    /// Stream holds no event
    #[error("event not found")]
    NotFound,

    /// Caller is not the event's seller
    #[error("only the event's seller may do this")]
    NotOwner,

    /// Name is blank
    #[error("event name must not be empty")]
    EmptyName,

    /// Nothing to sell
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
}

impl EventError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists(_) => ErrorKind::Conflict,
            Self::NotFound | Self::NotOwner | Self::EmptyName | Self::ZeroCapacity => {
                ErrorKind::Validation
            }
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for event creation and cancellation
#[derive(Clone, Copy, Debug, Default)]
pub struct EventReducer;

impl EventReducer {
    /// Creates a new `EventReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_create(ledger: &EventLedger, details: &NewEvent) -> Result<(), EventError> {
        if let Some(existing) = ledger.event_id() {
            return Err(EventError::AlreadyExists(existing));
        }
        if details.name.trim().is_empty() {
            return Err(EventError::EmptyName);
        }
        if details.total_capacity == 0 {
            return Err(EventError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Reducer for EventReducer {
    type Action = EventAction;
    type Output = Event;
    type Error = EventError;

    fn reduce(
        &self,
        ledger: &mut EventLedger,
        action: EventAction,
        env: &LedgerEnvironment,
    ) -> Result<Reduced<Event>, EventError> {
        let mut recorder = Recorder::new();
        match action {
            EventAction::Create {
                event_id,
                seller_id,
                details,
            } => {
                Self::validate_create(ledger, &details)?;
                let event = Event {
                    id: event_id,
                    seller_id,
                    name: details.name.trim().to_string(),
                    event_date: details.event_date,
                    unit_price: details.unit_price,
                    total_capacity: details.total_capacity,
                    payout_account: details.payout_account.filter(|account| !account.is_empty()),
                    is_cancelled: false,
                    created_at: env.now(),
                };
                recorder.record(ledger, LedgerEvent::EventCreated { event: event.clone() });
                Ok(recorder.finish(event))
            }
            EventAction::Cancel { seller_id } => {
                let event = ledger.event().ok_or(EventError::NotFound)?;
                if !event.is_owned_by(&seller_id) {
                    return Err(EventError::NotOwner);
                }
                if !event.is_cancelled {
                    recorder.record(
                        ledger,
                        LedgerEvent::EventCancelled {
                            cancelled_at: env.now(),
                        },
                    );
                }
                let event = ledger.event().cloned().ok_or(EventError::NotFound)?;
                Ok(recorder.finish(event))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::environment::FixedClock;
    use crate::reducer::SalesPolicy;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn env() -> LedgerEnvironment {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        LedgerEnvironment::new(Arc::new(FixedClock::new(now)), SalesPolicy::default())
    }

    fn details() -> NewEvent {
        NewEvent {
            name: "  Launch party ".to_string(),
            event_date: Utc.with_ymd_and_hms(2025, 2, 1, 20, 0, 0).unwrap(),
            unit_price: Money::from_cents(1500),
            total_capacity: 50,
            payout_account: Some("acct_seller".to_string()),
        }
    }

    fn create(ledger: &mut EventLedger) -> Event {
        EventReducer
            .reduce(
                ledger,
                EventAction::Create {
                    event_id: EventId::new(),
                    seller_id: SellerId::new("seller"),
                    details: details(),
                },
                &env(),
            )
            .unwrap()
            .output
    }

    #[test]
    fn test_create_event() {
        let mut ledger = EventLedger::new();
        let event = create(&mut ledger);

        assert_eq!(event.name, "Launch party");
        assert!(!event.is_cancelled);
        assert_eq!(ledger.event(), Some(&event));
    }

    #[test]
    fn test_create_rejects_zero_capacity() {
        let mut ledger = EventLedger::new();
        let mut bad = details();
        bad.total_capacity = 0;

        let result = EventReducer.reduce(
            &mut ledger,
            EventAction::Create {
                event_id: EventId::new(),
                seller_id: SellerId::new("seller"),
                details: bad,
            },
            &env(),
        );
        assert_eq!(result, Err(EventError::ZeroCapacity));
    }

    #[test]
    fn test_cancel_is_owner_only_and_monotonic() {
        let mut ledger = EventLedger::new();
        create(&mut ledger);

        let stranger = EventReducer.reduce(
            &mut ledger,
            EventAction::Cancel {
                seller_id: SellerId::new("someone-else"),
            },
            &env(),
        );
        assert_eq!(stranger, Err(EventError::NotOwner));

        let first = EventReducer
            .reduce(
                &mut ledger,
                EventAction::Cancel {
                    seller_id: SellerId::new("seller"),
                },
                &env(),
            )
            .unwrap();
        assert_eq!(first.events.len(), 1);
        assert!(first.output.is_cancelled);

        let second = EventReducer
            .reduce(
                &mut ledger,
                EventAction::Cancel {
                    seller_id: SellerId::new("seller"),
                },
                &env(),
            )
            .unwrap();
        assert!(second.events.is_empty());
    }
}
