//! Ticket issuance for a settled payment.
//!
//! The only writer of tickets. A payment reference is claimed exactly once,
//! either by `TicketsIssued` or by `PaymentUnfulfilled`; replaying the same
//! reference returns the recorded result without emitting anything.

use super::waitlist::consume_event;
use crate::error::ErrorKind;
use crate::ledger::{EventLedger, LedgerEvent, PaymentRecord};
use crate::reducer::{LedgerEnvironment, Recorder, Reduced, Reducer};
use crate::types::{
    BuyerId, BuyerProfile, EntryId, EntryStatus, Money, PaymentReference, Ticket, TicketId,
    TicketStatus,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A settled payment to turn into tickets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueTickets {
    /// Processor charge id
    pub payment_reference: PaymentReference,
    /// Entry the checkout was made through
    pub entry_id: EntryId,
    /// Buyer who paid
    pub buyer_id: BuyerId,
    /// Admissions paid for
    pub quantity: u32,
    /// Names to print, by ticket index
    pub attendee_names: Option<Vec<String>>,
    /// Buyer contact details
    pub buyer: BuyerProfile,
    /// Amount the processor reported
    pub amount: Money,
}

/// Result of reconciling one payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Tickets were issued by this call
    Issued {
        /// New tickets
        tickets: Vec<Ticket>,
    },
    /// The reference had already produced tickets; nothing changed
    AlreadyProcessed {
        /// Tickets issued the first time
        tickets: Vec<Ticket>,
    },
    /// Payment recorded but no tickets could be issued
    Unfulfilled {
        /// Why
        reason: String,
    },
}

impl ReconcileOutcome {
    /// Tickets the payment produced, if any
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        match self {
            Self::Issued { tickets } | Self::AlreadyProcessed { tickets } => tickets,
            Self::Unfulfilled { .. } => &[],
        }
    }

    /// Label for logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Issued { .. } => "issued",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::Unfulfilled { .. } => "unfulfilled",
        }
    }
}

/// Issuance rejections: the payment does not belong to this ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssuanceError {
    /// Stream holds no event
    #[error("event not found")]
    EventNotFound,

    /// Entry id from the payment metadata is unknown
    #[error("waiting list entry {0} not found")]
    EntryNotFound(EntryId),

    /// Entry belongs to a different buyer than the payment
    #[error("waiting list entry {0} belongs to another buyer")]
    BuyerMismatch(EntryId),

    /// Zero admissions
    #[error("quantity must be at least 1")]
    InvalidQuantity,
}

impl IssuanceError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Reducer issuing tickets for settled payments
#[derive(Clone, Copy, Debug, Default)]
pub struct IssuanceReducer;

impl IssuanceReducer {
    /// Creates a new `IssuanceReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Why `command` cannot be fulfilled against `ledger`, if it cannot.
    fn refusal(ledger: &EventLedger, command: &IssueTickets, env: &LedgerEnvironment) -> Option<String> {
        let now = env.now();
        let event = ledger.event()?;
        if event.is_cancelled {
            return Some("event has been cancelled".to_string());
        }

        let entry = ledger.entry(command.entry_id)?;
        match entry.status {
            EntryStatus::Waiting => return Some("no offer was granted to this entry".to_string()),
            EntryStatus::Purchased => {
                return Some("offer was already used by another payment".to_string());
            }
            EntryStatus::Offered | EntryStatus::Expired | EntryStatus::Cancelled => {}
        }

        let own_hold = u32::from(entry.status_at(now) == EntryStatus::Offered);
        let available = ledger.remaining_capacity(now).saturating_add(own_hold);
        (command.quantity > available).then(|| {
            format!(
                "requested {} tickets but only {available} remain",
                command.quantity
            )
        })
    }

    fn tickets(ledger: &EventLedger, command: &IssueTickets, env: &LedgerEnvironment) -> Vec<Ticket> {
        let Some(event_id) = ledger.event_id() else {
            return Vec::new();
        };
        let quantity = u64::from(command.quantity);
        let share = command.amount.cents() / quantity;
        let remainder = command.amount.cents() % quantity;
        let names = command.attendee_names.as_deref().unwrap_or_default();

        (0..command.quantity as usize)
            .map(|index| Ticket {
                id: TicketId::new(),
                event_id,
                buyer_id: command.buyer_id.clone(),
                attendee_name: names
                    .get(index)
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty()),
                buyer: command.buyer.clone(),
                status: TicketStatus::Valid,
                purchased_at: env.now(),
                payment_reference: command.payment_reference.clone(),
                amount_paid: Money::from_cents(if index == 0 { share + remainder } else { share }),
            })
            .collect()
    }
}

impl Reducer for IssuanceReducer {
    type Action = IssueTickets;
    type Output = ReconcileOutcome;
    type Error = IssuanceError;

    fn reduce(
        &self,
        ledger: &mut EventLedger,
        command: IssueTickets,
        env: &LedgerEnvironment,
    ) -> Result<Reduced<ReconcileOutcome>, IssuanceError> {
        if ledger.event().is_none() {
            return Err(IssuanceError::EventNotFound);
        }

        match ledger.payment(&command.payment_reference) {
            Some(PaymentRecord::Issued { .. }) => {
                let tickets = ledger.tickets_for_payment(&command.payment_reference);
                return Ok(Reduced::unchanged(ReconcileOutcome::AlreadyProcessed { tickets }));
            }
            Some(PaymentRecord::Unfulfilled { reason, .. }) => {
                return Ok(Reduced::unchanged(ReconcileOutcome::Unfulfilled {
                    reason: reason.clone(),
                }));
            }
            None => {}
        }

        let entry = ledger
            .entry(command.entry_id)
            .ok_or(IssuanceError::EntryNotFound(command.entry_id))?;
        if entry.buyer_id != command.buyer_id {
            return Err(IssuanceError::BuyerMismatch(command.entry_id));
        }
        if command.quantity == 0 {
            return Err(IssuanceError::InvalidQuantity);
        }

        let mut recorder = Recorder::new();
        let now = env.now();

        if let Some(reason) = Self::refusal(ledger, &command, env) {
            recorder.record(
                ledger,
                LedgerEvent::PaymentUnfulfilled {
                    payment_reference: command.payment_reference,
                    entry_id: command.entry_id,
                    amount: command.amount,
                    reason: reason.clone(),
                    recorded_at: now,
                },
            );
            return Ok(recorder.finish(ReconcileOutcome::Unfulfilled { reason }));
        }

        let consumed = consume_event(ledger, command.entry_id, now)
            .map_err(|_| IssuanceError::EntryNotFound(command.entry_id))?;
        recorder.record(ledger, consumed);

        let tickets = Self::tickets(ledger, &command, env);
        recorder.record(
            ledger,
            LedgerEvent::TicketsIssued {
                payment_reference: command.payment_reference,
                entry_id: command.entry_id,
                tickets: tickets.clone(),
            },
        );
        Ok(recorder.finish(ReconcileOutcome::Issued { tickets }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::environment::FixedClock;
    use crate::reducer::SalesPolicy;
    use crate::types::{Event, EventId, SellerId};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 18, 0, 0).unwrap()
    }

    fn env() -> LedgerEnvironment {
        LedgerEnvironment::new(Arc::new(FixedClock::new(now())), SalesPolicy::default())
    }

    /// Event with `capacity` and one offer held by "buyer".
    fn offered(capacity: u32) -> (EventLedger, EntryId) {
        let entry_id = EntryId::new();
        let ledger = EventLedger::replay(&[
            LedgerEvent::EventCreated {
                event: Event {
                    id: EventId::new(),
                    seller_id: SellerId::new("seller"),
                    name: "Gala".to_string(),
                    event_date: now() + Duration::days(3),
                    unit_price: Money::from_cents(5000),
                    total_capacity: capacity,
                    payout_account: Some("acct".to_string()),
                    is_cancelled: false,
                    created_at: now(),
                },
            },
            LedgerEvent::BuyerJoined {
                entry_id,
                buyer_id: BuyerId::new("buyer"),
                joined_at: now(),
            },
            LedgerEvent::OfferGranted {
                entry_id,
                expires_at: now() + Duration::minutes(30),
            },
        ]);
        (ledger, entry_id)
    }

    fn command(entry_id: EntryId, reference: &str, quantity: u32) -> IssueTickets {
        IssueTickets {
            payment_reference: PaymentReference::new(reference),
            entry_id,
            buyer_id: BuyerId::new("buyer"),
            quantity,
            attendee_names: Some(vec!["Ada".to_string(), " ".to_string()]),
            buyer: BuyerProfile {
                name: Some("Ada Lovelace".to_string()),
                email: Some("ada@example.com".to_string()),
            },
            amount: Money::from_cents(10_001),
        }
    }

    #[test]
    fn test_issues_one_ticket_per_unit() {
        let (mut ledger, entry_id) = offered(5);

        let reduced = IssuanceReducer
            .reduce(&mut ledger, command(entry_id, "pi_1", 2), &env())
            .unwrap();

        let tickets = reduced.output.tickets();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].amount_paid, Money::from_cents(5001));
        assert_eq!(tickets[1].amount_paid, Money::from_cents(5000));
        assert_eq!(tickets[0].attendee_name.as_deref(), Some("Ada"));
        assert_eq!(tickets[1].attendee_name, None);
        assert_eq!(ledger.entry(entry_id).unwrap().status, EntryStatus::Purchased);
        assert_eq!(ledger.admissions(), 2);
    }

    #[test]
    fn test_same_reference_is_a_no_op() {
        let (mut ledger, entry_id) = offered(5);
        let first = IssuanceReducer
            .reduce(&mut ledger, command(entry_id, "pi_1", 1), &env())
            .unwrap();
        let second = IssuanceReducer
            .reduce(&mut ledger, command(entry_id, "pi_1", 1), &env())
            .unwrap();

        assert!(second.events.is_empty());
        assert_eq!(
            second.output,
            ReconcileOutcome::AlreadyProcessed {
                tickets: first.output.tickets().to_vec()
            }
        );
        assert_eq!(ledger.tickets().len(), 1);
    }

    #[test]
    fn test_capacity_shortfall_records_unfulfilled_payment() {
        let (mut ledger, entry_id) = offered(2);

        let reduced = IssuanceReducer
            .reduce(&mut ledger, command(entry_id, "pi_1", 3), &env())
            .unwrap();

        assert!(matches!(reduced.output, ReconcileOutcome::Unfulfilled { .. }));
        assert!(ledger.tickets().is_empty());
        assert!(matches!(
            ledger.payment(&PaymentReference::new("pi_1")),
            Some(PaymentRecord::Unfulfilled { .. })
        ));
        // The offer is still live; the buyer can retry with a smaller order.
        assert_eq!(ledger.entry(entry_id).unwrap().status, EntryStatus::Offered);
    }

    #[test]
    fn test_second_payment_for_consumed_offer_is_unfulfilled() {
        let (mut ledger, entry_id) = offered(5);
        IssuanceReducer
            .reduce(&mut ledger, command(entry_id, "pi_1", 1), &env())
            .unwrap();

        let reduced = IssuanceReducer
            .reduce(&mut ledger, command(entry_id, "pi_2", 1), &env())
            .unwrap();

        assert!(matches!(reduced.output, ReconcileOutcome::Unfulfilled { .. }));
        assert_eq!(ledger.tickets().len(), 1);
    }

    #[test]
    fn test_buyer_must_match_entry() {
        let (mut ledger, entry_id) = offered(5);
        let mut foreign = command(entry_id, "pi_1", 1);
        foreign.buyer_id = BuyerId::new("other");

        let result = IssuanceReducer.reduce(&mut ledger, foreign, &env());
        assert_eq!(result, Err(IssuanceError::BuyerMismatch(entry_id)));
    }
}
