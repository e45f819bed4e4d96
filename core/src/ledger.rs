//! Per-event inventory ledger.
//!
//! Each event is an append-only stream of [`LedgerEvent`]s. Folding the stream
//! yields an [`EventLedger`]: the event record, its waiting list in join order,
//! the tickets issued against it and the payment references already claimed.
//!
//! Capacity is always derived, never stored:
//!
//! ```text
//! remaining = total_capacity - tickets{valid, used} - offers{unexpired}
//! ```

use crate::types::{
    AttendeeInfo, BuyerId, EntryId, EntryStatus, Event, EventId, Money, PaymentReference, Ticket,
    TicketId, TicketStatus, WaitingListEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Facts recorded against an event's stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Seller created the event
    EventCreated {
        /// The new event
        event: Event,
    },

    /// Seller cancelled the event; outstanding valid tickets are voided
    EventCancelled {
        /// When
        cancelled_at: DateTime<Utc>,
    },

    /// Buyer entered the waiting list
    BuyerJoined {
        /// New entry
        entry_id: EntryId,
        /// Buyer
        buyer_id: BuyerId,
        /// When
        joined_at: DateTime<Utc>,
    },

    /// Waiting entry promoted to a time-boxed offer
    OfferGranted {
        /// Promoted entry
        entry_id: EntryId,
        /// Instant after which the offer is void
        expires_at: DateTime<Utc>,
    },

    /// Offer lapsed without purchase
    OfferExpired {
        /// Entry
        entry_id: EntryId,
        /// When the lapse was recorded
        expired_at: DateTime<Utc>,
    },

    /// Buyer gave the offer back
    OfferReleased {
        /// Entry
        entry_id: EntryId,
        /// When
        released_at: DateTime<Utc>,
    },

    /// Offer converted into tickets
    OfferConsumed {
        /// Entry
        entry_id: EntryId,
        /// When
        consumed_at: DateTime<Utc>,
    },

    /// Tickets created for a settled payment
    TicketsIssued {
        /// Processor charge that paid for the tickets
        payment_reference: PaymentReference,
        /// Entry the purchase was made through
        entry_id: EntryId,
        /// One ticket per admission
        tickets: Vec<Ticket>,
    },

    /// A settled payment that could not be turned into tickets
    PaymentUnfulfilled {
        /// Processor charge
        payment_reference: PaymentReference,
        /// Entry the purchase was attempted through
        entry_id: EntryId,
        /// Amount the processor reported as paid
        amount: Money,
        /// Why issuance was refused
        reason: String,
        /// When
        recorded_at: DateTime<Utc>,
    },

    /// Ticket redeemed at the door
    TicketCheckedIn {
        /// Ticket
        ticket_id: TicketId,
        /// When
        checked_in_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Event type name for logs and metrics
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::EventCreated { .. } => "EventCreated.v1",
            Self::EventCancelled { .. } => "EventCancelled.v1",
            Self::BuyerJoined { .. } => "BuyerJoined.v1",
            Self::OfferGranted { .. } => "OfferGranted.v1",
            Self::OfferExpired { .. } => "OfferExpired.v1",
            Self::OfferReleased { .. } => "OfferReleased.v1",
            Self::OfferConsumed { .. } => "OfferConsumed.v1",
            Self::TicketsIssued { .. } => "TicketsIssued.v1",
            Self::PaymentUnfulfilled { .. } => "PaymentUnfulfilled.v1",
            Self::TicketCheckedIn { .. } => "TicketCheckedIn.v1",
        }
    }

    /// Payment reference this event claims, if any.
    ///
    /// Stores index these so a reference can never be claimed twice.
    #[must_use]
    pub const fn claimed_payment_reference(&self) -> Option<&PaymentReference> {
        match self {
            Self::TicketsIssued {
                payment_reference, ..
            }
            | Self::PaymentUnfulfilled {
                payment_reference, ..
            } => Some(payment_reference),
            _ => None,
        }
    }
}

/// What became of a claimed payment reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentRecord {
    /// Tickets were issued
    Issued {
        /// Entry consumed by the purchase
        entry_id: EntryId,
        /// Tickets created, in issue order
        ticket_ids: Vec<TicketId>,
    },
    /// Payment recorded without tickets
    Unfulfilled {
        /// Entry the purchase was attempted through
        entry_id: EntryId,
        /// Amount paid
        amount: Money,
        /// Why issuance was refused
        reason: String,
    },
}

/// A buyer's view of their place in the waiting list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    /// Entry
    pub entry_id: EntryId,
    /// Status as observed now (stale offers read as expired)
    pub status: EntryStatus,
    /// Offer expiry, present while offered
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// 1-based position among waiting entries, present while waiting
    pub position: Option<u32>,
    /// Whether the buyer may start a checkout now
    pub purchasable: bool,
}

/// One admitted attendee as shown to the seller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Ticket
    pub ticket_id: TicketId,
    /// Valid or used
    pub status: TicketStatus,
    /// When the ticket was bought
    pub purchased_at: DateTime<Utc>,
    /// Buyer
    pub buyer_id: BuyerId,
    /// Display info
    #[serde(flatten)]
    pub info: AttendeeInfo,
}

/// Seller dashboard counters for one event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    /// Capacity the event was created with
    pub total_capacity: u32,
    /// Valid plus used tickets
    pub sold: u32,
    /// Used tickets
    pub checked_in: u32,
    /// Refunded tickets
    pub refunded: u32,
    /// Cancelled tickets
    pub cancelled: u32,
    /// Buyers still waiting
    pub waiting: u32,
    /// Unexpired offers
    pub live_offers: u32,
    /// Capacity left to offer
    pub remaining: u32,
    /// Amount paid for valid and used tickets
    pub revenue: Money,
    /// Payments recorded without tickets
    pub unfulfilled_payments: u32,
}

/// Folded state of one event's stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLedger {
    event: Option<Event>,
    entries: Vec<WaitingListEntry>,
    tickets: Vec<Ticket>,
    payments: HashMap<PaymentReference, PaymentRecord>,
}

impl EventLedger {
    /// Empty ledger (no event created yet)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from its stream
    #[must_use]
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Self {
        let mut ledger = Self::new();
        for event in events {
            ledger.apply(event);
        }
        ledger
    }

    /// Folds one event into the ledger
    pub fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::EventCreated { event } => {
                self.event = Some(event.clone());
            }
            LedgerEvent::EventCancelled { .. } => {
                if let Some(event) = self.event.as_mut() {
                    event.is_cancelled = true;
                }
                for ticket in &mut self.tickets {
                    if ticket.status == TicketStatus::Valid {
                        ticket.status = TicketStatus::Cancelled;
                    }
                }
            }
            LedgerEvent::BuyerJoined {
                entry_id,
                buyer_id,
                joined_at,
            } => {
                if let Some(event_id) = self.event_id() {
                    self.entries.push(WaitingListEntry {
                        id: *entry_id,
                        event_id,
                        buyer_id: buyer_id.clone(),
                        status: EntryStatus::Waiting,
                        joined_at: *joined_at,
                        offer_expires_at: None,
                    });
                }
            }
            LedgerEvent::OfferGranted {
                entry_id,
                expires_at,
            } => {
                if let Some(entry) = self.entry_mut(*entry_id) {
                    entry.status = EntryStatus::Offered;
                    entry.offer_expires_at = Some(*expires_at);
                }
            }
            LedgerEvent::OfferExpired { entry_id, .. } => {
                self.set_entry_status(*entry_id, EntryStatus::Expired);
            }
            LedgerEvent::OfferReleased { entry_id, .. } => {
                self.set_entry_status(*entry_id, EntryStatus::Cancelled);
            }
            LedgerEvent::OfferConsumed { entry_id, .. } => {
                self.set_entry_status(*entry_id, EntryStatus::Purchased);
            }
            LedgerEvent::TicketsIssued {
                payment_reference,
                entry_id,
                tickets,
            } => {
                self.tickets.extend(tickets.iter().cloned());
                self.payments.insert(
                    payment_reference.clone(),
                    PaymentRecord::Issued {
                        entry_id: *entry_id,
                        ticket_ids: tickets.iter().map(|ticket| ticket.id).collect(),
                    },
                );
            }
            LedgerEvent::PaymentUnfulfilled {
                payment_reference,
                entry_id,
                amount,
                reason,
                ..
            } => {
                self.payments.insert(
                    payment_reference.clone(),
                    PaymentRecord::Unfulfilled {
                        entry_id: *entry_id,
                        amount: *amount,
                        reason: reason.clone(),
                    },
                );
            }
            LedgerEvent::TicketCheckedIn { ticket_id, .. } => {
                if let Some(ticket) = self.tickets.iter_mut().find(|t| t.id == *ticket_id) {
                    ticket.status = TicketStatus::Used;
                }
            }
        }
    }

    fn entry_mut(&mut self, entry_id: EntryId) -> Option<&mut WaitingListEntry> {
        self.entries.iter_mut().find(|entry| entry.id == entry_id)
    }

    fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) {
        if let Some(entry) = self.entry_mut(entry_id) {
            entry.status = status;
        }
    }

    /// The event record, once created
    #[must_use]
    pub const fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    /// The event's id, once created
    #[must_use]
    pub fn event_id(&self) -> Option<EventId> {
        self.event.as_ref().map(|event| event.id)
    }

    /// Waiting-list entries in join order
    #[must_use]
    pub fn entries(&self) -> &[WaitingListEntry] {
        &self.entries
    }

    /// Looks up an entry
    #[must_use]
    pub fn entry(&self, entry_id: EntryId) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    /// Tickets in issue order
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Looks up a ticket
    #[must_use]
    pub fn ticket(&self, ticket_id: TicketId) -> Option<&Ticket> {
        self.tickets.iter().find(|ticket| ticket.id == ticket_id)
    }

    /// What a claimed payment reference produced
    #[must_use]
    pub fn payment(&self, reference: &PaymentReference) -> Option<&PaymentRecord> {
        self.payments.get(reference)
    }

    /// Tickets issued for a payment reference (empty if none)
    #[must_use]
    pub fn tickets_for_payment(&self, reference: &PaymentReference) -> Vec<Ticket> {
        self.tickets
            .iter()
            .filter(|ticket| &ticket.payment_reference == reference)
            .cloned()
            .collect()
    }

    /// A buyer's tickets for this event, in issue order
    pub fn tickets_for_buyer<'a>(&'a self, buyer_id: &'a BuyerId) -> impl Iterator<Item = &'a Ticket> {
        self.tickets
            .iter()
            .filter(move |ticket| &ticket.buyer_id == buyer_id)
    }

    /// Status of `entry` as observed at `now`
    #[must_use]
    pub fn effective_status(entry: &WaitingListEntry, now: DateTime<Utc>) -> EntryStatus {
        entry.status_at(now)
    }

    /// The buyer's most recent entry, terminal or not
    #[must_use]
    pub fn entry_for_buyer(&self, buyer_id: &BuyerId) -> Option<&WaitingListEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| &entry.buyer_id == buyer_id)
    }

    /// The buyer's entry that is still waiting or holding a live offer at `now`
    #[must_use]
    pub fn active_entry_for_buyer(
        &self,
        buyer_id: &BuyerId,
        now: DateTime<Utc>,
    ) -> Option<&WaitingListEntry> {
        self.entries
            .iter()
            .find(|entry| &entry.buyer_id == buyer_id && !entry.status_at(now).is_terminal())
    }

    /// Tickets counting against capacity
    #[must_use]
    pub fn admissions(&self) -> u32 {
        count(self.tickets.iter().filter(|ticket| ticket.status.is_admission()))
    }

    /// Offers still holding capacity at `now`
    #[must_use]
    pub fn live_offers(&self, now: DateTime<Utc>) -> u32 {
        count(
            self.entries
                .iter()
                .filter(|entry| entry.status_at(now) == EntryStatus::Offered),
        )
    }

    /// Offers whose expiry has passed but are still stored as offered
    #[must_use]
    pub fn lapsed_offers(&self, now: DateTime<Utc>) -> Vec<EntryId> {
        self.entries
            .iter()
            .filter(|entry| entry.offer_lapsed(now))
            .map(|entry| entry.id)
            .collect()
    }

    /// Capacity not yet sold or held
    #[must_use]
    pub fn remaining_capacity(&self, now: DateTime<Utc>) -> u32 {
        self.event.as_ref().map_or(0, |event| {
            event
                .total_capacity
                .saturating_sub(self.admissions())
                .saturating_sub(self.live_offers(now))
        })
    }

    /// Largest order an offer holder may place: `min(cap, max(1, remaining + 1))`.
    ///
    /// The `+ 1` is the slot the holder's own offer already reserves.
    #[must_use]
    pub fn max_purchasable_quantity(&self, now: DateTime<Utc>, per_order_cap: u32) -> u32 {
        per_order_cap.min(self.remaining_capacity(now).saturating_add(1).max(1))
    }

    /// Whether a promotion pass at `now` would change anything: an offer has
    /// lapsed, or capacity is free while buyers are waiting.
    #[must_use]
    pub fn promotion_due(&self, now: DateTime<Utc>) -> bool {
        let open = self
            .event
            .as_ref()
            .is_some_and(|event| !event.is_cancelled && !event.sales_closed(now));
        if !open {
            return false;
        }
        let waiting = self
            .entries
            .iter()
            .any(|entry| entry.status == EntryStatus::Waiting);
        self.entries.iter().any(|entry| entry.offer_lapsed(now))
            || (waiting && self.remaining_capacity(now) > 0)
    }

    /// The buyer's queue status at `now`, or `None` if they never joined
    #[must_use]
    pub fn queue_position(&self, buyer_id: &BuyerId, now: DateTime<Utc>) -> Option<QueuePosition> {
        let entry = self
            .active_entry_for_buyer(buyer_id, now)
            .or_else(|| self.entry_for_buyer(buyer_id))?;
        let status = entry.status_at(now);

        let position = (status == EntryStatus::Waiting).then(|| {
            let ahead = self
                .entries
                .iter()
                .take_while(|other| other.id != entry.id)
                .filter(|other| other.status == EntryStatus::Waiting)
                .count();
            u32::try_from(ahead).map_or(u32::MAX, |ahead| ahead.saturating_add(1))
        });

        let cancelled = self.event.as_ref().is_none_or(|event| event.is_cancelled);
        Some(QueuePosition {
            entry_id: entry.id,
            status,
            offer_expires_at: (status == EntryStatus::Offered)
                .then_some(entry.offer_expires_at)
                .flatten(),
            position,
            purchasable: status == EntryStatus::Offered && !cancelled,
        })
    }

    /// Valid and used tickets with their display info
    #[must_use]
    pub fn attendees(&self) -> Vec<Attendee> {
        self.tickets
            .iter()
            .filter(|ticket| ticket.status.is_admission())
            .map(|ticket| Attendee {
                ticket_id: ticket.id,
                status: ticket.status,
                purchased_at: ticket.purchased_at,
                buyer_id: ticket.buyer_id.clone(),
                info: AttendeeInfo::from(ticket),
            })
            .collect()
    }

    /// Seller dashboard counters at `now`
    #[must_use]
    pub fn sales_summary(&self, now: DateTime<Utc>) -> SalesSummary {
        let mut summary = SalesSummary {
            total_capacity: self.event.as_ref().map_or(0, |event| event.total_capacity),
            waiting: count(
                self.entries
                    .iter()
                    .filter(|entry| entry.status == EntryStatus::Waiting),
            ),
            live_offers: self.live_offers(now),
            remaining: self.remaining_capacity(now),
            unfulfilled_payments: count(
                self.payments
                    .values()
                    .filter(|record| matches!(record, PaymentRecord::Unfulfilled { .. })),
            ),
            ..SalesSummary::default()
        };

        for ticket in &self.tickets {
            match ticket.status {
                TicketStatus::Valid => summary.sold += 1,
                TicketStatus::Used => {
                    summary.sold += 1;
                    summary.checked_in += 1;
                }
                TicketStatus::Refunded => summary.refunded += 1,
                TicketStatus::Cancelled => summary.cancelled += 1,
            }
            if ticket.status.is_admission() {
                summary.revenue = summary.revenue.saturating_add(ticket.amount_paid);
            }
        }
        summary
    }
}

fn count<T>(items: impl Iterator<Item = T>) -> u32 {
    u32::try_from(items.count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::types::{BuyerProfile, SellerId};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn created(capacity: u32) -> (EventId, LedgerEvent) {
        let id = EventId::new();
        let event = Event {
            id,
            seller_id: SellerId::new("seller"),
            name: "Show".to_string(),
            event_date: now() + Duration::days(30),
            unit_price: Money::from_cents(2500),
            total_capacity: capacity,
            payout_account: Some("acct_1".to_string()),
            is_cancelled: false,
            created_at: now(),
        };
        (id, LedgerEvent::EventCreated { event })
    }

    fn joined(buyer: &str) -> (EntryId, LedgerEvent) {
        let entry_id = EntryId::new();
        (
            entry_id,
            LedgerEvent::BuyerJoined {
                entry_id,
                buyer_id: BuyerId::new(buyer),
                joined_at: now(),
            },
        )
    }

    fn ticket(event_id: EventId, buyer: &str, reference: &str) -> Ticket {
        Ticket {
            id: TicketId::new(),
            event_id,
            buyer_id: BuyerId::new(buyer),
            attendee_name: None,
            buyer: BuyerProfile::default(),
            status: TicketStatus::Valid,
            purchased_at: now(),
            payment_reference: PaymentReference::new(reference),
            amount_paid: Money::from_cents(2500),
        }
    }

    #[test]
    fn test_remaining_capacity_counts_tickets_and_live_offers() {
        let (event_id, created) = created(3);
        let (a, join_a) = joined("a");
        let (b, join_b) = joined("b");
        let ledger = EventLedger::replay(&[
            created,
            join_a,
            join_b,
            LedgerEvent::OfferGranted {
                entry_id: a,
                expires_at: now() + Duration::minutes(30),
            },
            LedgerEvent::OfferGranted {
                entry_id: b,
                expires_at: now() + Duration::minutes(30),
            },
            LedgerEvent::OfferConsumed {
                entry_id: b,
                consumed_at: now(),
            },
            LedgerEvent::TicketsIssued {
                payment_reference: PaymentReference::new("pi_1"),
                entry_id: b,
                tickets: vec![ticket(event_id, "b", "pi_1")],
            },
        ]);

        assert_eq!(ledger.admissions(), 1);
        assert_eq!(ledger.live_offers(now()), 1);
        assert_eq!(ledger.remaining_capacity(now()), 1);

        // Once a's offer lapses its hold is released without any write.
        assert_eq!(ledger.remaining_capacity(now() + Duration::minutes(30)), 2);
    }

    #[test]
    fn test_promotion_due_after_offer_lapses() {
        let (_, created) = created(1);
        let (a, join_a) = joined("a");
        let (_, join_b) = joined("b");
        let ledger = EventLedger::replay(&[
            created,
            join_a,
            join_b,
            LedgerEvent::OfferGranted {
                entry_id: a,
                expires_at: now() + Duration::minutes(30),
            },
        ]);

        assert!(!ledger.promotion_due(now()));
        assert!(ledger.promotion_due(now() + Duration::minutes(30)));
    }

    #[test]
    fn test_max_purchasable_quantity_includes_own_hold() {
        let (_, created) = created(15);
        let (a, join_a) = joined("a");
        let ledger = EventLedger::replay(&[
            created,
            join_a,
            LedgerEvent::OfferGranted {
                entry_id: a,
                expires_at: now() + Duration::minutes(30),
            },
        ]);

        assert_eq!(ledger.remaining_capacity(now()), 14);
        assert_eq!(ledger.max_purchasable_quantity(now(), 10), 10);
        assert_eq!(ledger.max_purchasable_quantity(now(), 20), 15);
    }

    #[test]
    fn test_queue_position_reports_stale_offer_as_not_purchasable() {
        let (_, created) = created(1);
        let (a, join_a) = joined("a");
        let ledger = EventLedger::replay(&[
            created,
            join_a,
            LedgerEvent::OfferGranted {
                entry_id: a,
                expires_at: now() - Duration::seconds(1),
            },
        ]);

        let position = ledger.queue_position(&BuyerId::new("a"), now()).unwrap();
        assert_eq!(position.status, EntryStatus::Expired);
        assert!(!position.purchasable);
        assert_eq!(position.offer_expires_at, None);
    }

    #[test]
    fn test_queue_position_counts_waiting_entries_ahead() {
        let (_, created) = created(1);
        let (a, join_a) = joined("a");
        let (_, join_b) = joined("b");
        let (_, join_c) = joined("c");
        let ledger = EventLedger::replay(&[
            created,
            join_a,
            join_b,
            join_c,
            LedgerEvent::OfferGranted {
                entry_id: a,
                expires_at: now() + Duration::minutes(30),
            },
        ]);

        let c = ledger.queue_position(&BuyerId::new("c"), now()).unwrap();
        assert_eq!(c.status, EntryStatus::Waiting);
        assert_eq!(c.position, Some(2));
        assert!(ledger.queue_position(&BuyerId::new("d"), now()).is_none());
    }

    #[test]
    fn test_cancellation_voids_valid_tickets_only() {
        let (event_id, created) = created(2);
        let mut used = ticket(event_id, "a", "pi_1");
        used.status = TicketStatus::Used;
        let valid = ticket(event_id, "b", "pi_2");
        let ledger = EventLedger::replay(&[
            created,
            LedgerEvent::TicketsIssued {
                payment_reference: PaymentReference::new("pi_1"),
                entry_id: EntryId::new(),
                tickets: vec![used],
            },
            LedgerEvent::TicketsIssued {
                payment_reference: PaymentReference::new("pi_2"),
                entry_id: EntryId::new(),
                tickets: vec![valid],
            },
            LedgerEvent::EventCancelled {
                cancelled_at: now(),
            },
        ]);

        let summary = ledger.sales_summary(now());
        assert!(ledger.event().unwrap().is_cancelled);
        assert_eq!(summary.sold, 1);
        assert_eq!(summary.checked_in, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.revenue, Money::from_cents(2500));
        assert_eq!(ledger.attendees().len(), 1);
    }
}
