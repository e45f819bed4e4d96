//! Ledger store wrapper for failure testing
//!
//! [`FlakyLedgerStore`] forwards to a real store but can be told to fail the
//! next appends or loads with [`StoreError::Unavailable`].

use boxoffice_core::ledger::LedgerEvent;
use boxoffice_core::store::{LedgerStore, StoreError, StoreFuture, StoredStream, Version};
use boxoffice_core::types::{BuyerId, EventId, PaymentReference, Ticket, TicketId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Store that fails on demand.
///
/// # Example
///
/// ```
/// use boxoffice_testing::FlakyLedgerStore;
/// use boxoffice_core::store::{InMemoryLedgerStore, LedgerStore, StoreError, Version};
/// use boxoffice_core::types::EventId;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let store = FlakyLedgerStore::new(Arc::new(InMemoryLedgerStore::new()));
/// store.fail_next_appends(1);
///
/// let result = store.append(EventId::new(), Version::INITIAL, Vec::new()).await;
/// assert!(matches!(result, Err(StoreError::Unavailable(_))));
/// # }
/// ```
#[derive(Clone)]
pub struct FlakyLedgerStore {
    inner: Arc<dyn LedgerStore>,
    failing_appends: Arc<AtomicU32>,
    failing_loads: Arc<AtomicU32>,
    appends: Arc<AtomicUsize>,
}

impl FlakyLedgerStore {
    /// Wrap `inner`
    #[must_use]
    pub fn new(inner: Arc<dyn LedgerStore>) -> Self {
        Self {
            inner,
            failing_appends: Arc::new(AtomicU32::new(0)),
            failing_loads: Arc::new(AtomicU32::new(0)),
            appends: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `count` appends
    pub fn fail_next_appends(&self, count: u32) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` loads
    pub fn fail_next_loads(&self, count: u32) {
        self.failing_loads.store(count, Ordering::SeqCst);
    }

    /// Successful appends so far
    #[must_use]
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl std::fmt::Debug for FlakyLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyLedgerStore")
            .field("failing_appends", &self.failing_appends)
            .field("failing_loads", &self.failing_loads)
            .field("appends", &self.appends)
            .finish_non_exhaustive()
    }
}

impl LedgerStore for FlakyLedgerStore {
    fn append(
        &self,
        event_id: EventId,
        expected: Version,
        events: Vec<LedgerEvent>,
    ) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            if Self::take_failure(&self.failing_appends) {
                return Err(StoreError::Unavailable("injected append failure".to_string()));
            }
            let version = self.inner.append(event_id, expected, events).await?;
            self.appends.fetch_add(1, Ordering::SeqCst);
            Ok(version)
        })
    }

    fn load(&self, event_id: EventId) -> StoreFuture<'_, StoredStream> {
        Box::pin(async move {
            if Self::take_failure(&self.failing_loads) {
                return Err(StoreError::Unavailable("injected load failure".to_string()));
            }
            self.inner.load(event_id).await
        })
    }

    fn locate_ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<EventId>> {
        self.inner.locate_ticket(ticket_id)
    }

    fn find_issuance<'a>(
        &'a self,
        reference: &'a PaymentReference,
    ) -> StoreFuture<'a, Option<EventId>> {
        self.inner.find_issuance(reference)
    }

    fn tickets_for_buyer<'a>(&'a self, buyer_id: &'a BuyerId) -> StoreFuture<'a, Vec<Ticket>> {
        self.inner.tickets_for_buyer(buyer_id)
    }

    fn event_ids(&self) -> StoreFuture<'_, Vec<EventId>> {
        self.inner.event_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::store::InMemoryLedgerStore;

    #[tokio::test]
    async fn test_failures_are_consumed() {
        let store = FlakyLedgerStore::new(Arc::new(InMemoryLedgerStore::new()));
        store.fail_next_loads(1);

        assert!(store.load(EventId::new()).await.is_err());
        assert!(store.load(EventId::new()).await.is_ok());
    }
}
