//! In-process ledger store.

use super::{LedgerStore, StoreError, StoreFuture, StoredStream, Version};
use crate::ledger::{EventLedger, LedgerEvent};
use crate::types::{BuyerId, EventId, PaymentReference, Ticket, TicketId};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<EventId, Vec<LedgerEvent>>,
    creation_order: Vec<EventId>,
    payments: HashMap<PaymentReference, EventId>,
    tickets: HashMap<TicketId, EventId>,
    buyers: HashMap<BuyerId, BTreeSet<EventId>>,
}

impl Inner {
    fn version(&self, event_id: EventId) -> Version {
        Version::new(self.streams.get(&event_id).map_or(0, |events| events.len() as u64))
    }

    fn check_payment_references(&self, events: &[LedgerEvent]) -> Result<(), StoreError> {
        let mut batch = HashSet::new();
        for reference in events.iter().filter_map(LedgerEvent::claimed_payment_reference) {
            if self.payments.contains_key(reference) || !batch.insert(reference) {
                return Err(StoreError::DuplicatePaymentReference(reference.clone()));
            }
        }
        Ok(())
    }

    fn index(&mut self, event_id: EventId, event: &LedgerEvent) {
        if let Some(reference) = event.claimed_payment_reference() {
            self.payments.insert(reference.clone(), event_id);
        }
        if let LedgerEvent::TicketsIssued { tickets, .. } = event {
            for ticket in tickets {
                self.tickets.insert(ticket.id, event_id);
                self.buyers
                    .entry(ticket.buyer_id.clone())
                    .or_default()
                    .insert(event_id);
            }
        }
    }
}

/// Ledger store keeping every stream in memory behind one lock.
///
/// Holding the write lock across the version check, the unique-index check and
/// the write makes each append a single atomic step.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(
        &self,
        event_id: EventId,
        expected: Version,
        events: Vec<LedgerEvent>,
    ) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;

            let actual = inner.version(event_id);
            if actual != expected {
                return Err(StoreError::ConcurrencyConflict {
                    event_id,
                    expected,
                    actual,
                });
            }
            inner.check_payment_references(&events)?;

            if actual == Version::INITIAL && !events.is_empty() {
                inner.creation_order.push(event_id);
            }
            for event in &events {
                inner.index(event_id, event);
            }
            let stream = inner.streams.entry(event_id).or_default();
            stream.extend(events);
            Ok(Version::new(stream.len() as u64))
        })
    }

    fn load(&self, event_id: EventId) -> StoreFuture<'_, StoredStream> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let events = inner.streams.get(&event_id).cloned().unwrap_or_default();
            Ok(StoredStream {
                version: Version::new(events.len() as u64),
                events,
            })
        })
    }

    fn locate_ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<EventId>> {
        Box::pin(async move { Ok(self.inner.read().await.tickets.get(&ticket_id).copied()) })
    }

    fn find_issuance<'a>(
        &'a self,
        reference: &'a PaymentReference,
    ) -> StoreFuture<'a, Option<EventId>> {
        Box::pin(async move { Ok(self.inner.read().await.payments.get(reference).copied()) })
    }

    fn tickets_for_buyer<'a>(&'a self, buyer_id: &'a BuyerId) -> StoreFuture<'a, Vec<Ticket>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let Some(event_ids) = inner.buyers.get(buyer_id) else {
                return Ok(Vec::new());
            };

            let mut tickets = Vec::new();
            for event_id in event_ids {
                let Some(events) = inner.streams.get(event_id) else {
                    continue;
                };
                let ledger = EventLedger::replay(events);
                tickets.extend(ledger.tickets_for_buyer(buyer_id).cloned());
            }
            tickets.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
            Ok(tickets)
        })
    }

    fn event_ids(&self) -> StoreFuture<'_, Vec<EventId>> {
        Box::pin(async move { Ok(self.inner.read().await.creation_order.clone()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::types::{BuyerProfile, EntryId, Money, TicketStatus};
    use chrono::Utc;

    fn issued(event_id: EventId, reference: &str) -> LedgerEvent {
        LedgerEvent::TicketsIssued {
            payment_reference: PaymentReference::new(reference),
            entry_id: EntryId::new(),
            tickets: vec![Ticket {
                id: TicketId::new(),
                event_id,
                buyer_id: BuyerId::new("buyer"),
                attendee_name: None,
                buyer: BuyerProfile::default(),
                status: TicketStatus::Valid,
                purchased_at: Utc::now(),
                payment_reference: PaymentReference::new(reference),
                amount_paid: Money::from_cents(100),
            }],
        }
    }

    #[tokio::test]
    async fn test_append_checks_expected_version() {
        let store = InMemoryLedgerStore::new();
        let event_id = EventId::new();

        let version = store
            .append(event_id, Version::INITIAL, vec![issued(event_id, "pi_1")])
            .await
            .unwrap();
        assert_eq!(version, Version::new(1));

        let stale = store
            .append(event_id, Version::INITIAL, vec![issued(event_id, "pi_2")])
            .await;
        assert_eq!(
            stale,
            Err(StoreError::ConcurrencyConflict {
                event_id,
                expected: Version::INITIAL,
                actual: Version::new(1),
            })
        );
    }

    #[tokio::test]
    async fn test_payment_reference_is_unique_across_events() {
        let store = InMemoryLedgerStore::new();
        let first = EventId::new();
        let second = EventId::new();

        store
            .append(first, Version::INITIAL, vec![issued(first, "pi_1")])
            .await
            .unwrap();
        let duplicate = store
            .append(second, Version::INITIAL, vec![issued(second, "pi_1")])
            .await;

        assert_eq!(
            duplicate,
            Err(StoreError::DuplicatePaymentReference(PaymentReference::new("pi_1")))
        );
        assert!(store.load(second).await.unwrap().events.is_empty());
        assert_eq!(
            store.find_issuance(&PaymentReference::new("pi_1")).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_tickets_are_indexed_by_id_and_buyer() {
        let store = InMemoryLedgerStore::new();
        let event_id = EventId::new();
        let event = issued(event_id, "pi_1");
        let LedgerEvent::TicketsIssued { tickets, .. } = &event else {
            unreachable!()
        };
        let ticket_id = tickets[0].id;

        store
            .append(event_id, Version::INITIAL, vec![event])
            .await
            .unwrap();

        assert_eq!(store.locate_ticket(ticket_id).await.unwrap(), Some(event_id));
        let held = store.tickets_for_buyer(&BuyerId::new("buyer")).await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].id, ticket_id);
    }
}
