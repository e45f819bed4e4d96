//! Fixture builders.
//!
//! Every fixture starts from [`test_time`](crate::test_time) and a single
//! seller, `"seller"`, whose payout account is `"acct_seller"`.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Fixtures panic only on broken setup

use crate::mocks::{ManualClock, test_clock, test_time};
use crate::processor::RecordingPaymentProcessor;
use crate::store::FlakyLedgerStore;
use boxoffice_core::aggregates::NewEvent;
use boxoffice_core::checkout::{CheckoutRequest, CheckoutSettings};
use boxoffice_core::fees::FeeSchedule;
use boxoffice_core::ledger::LedgerEvent;
use boxoffice_core::reducer::SalesPolicy;
use boxoffice_core::service::{BoxOffice, CheckoutSession};
use boxoffice_core::store::InMemoryLedgerStore;
use boxoffice_core::types::{
    BuyerId, BuyerProfile, EntryId, Event, EventId, Money, SellerId, Ticket,
};
use chrono::Duration;
use std::sync::Arc;

/// Seller owning every fixture event
pub const SELLER: &str = "seller";

/// Payout account of [`SELLER`]
pub const PAYOUT_ACCOUNT: &str = "acct_seller";

/// Price of one fixture admission, in cents
pub const UNIT_PRICE_CENTS: u64 = 10_000;

/// The fixture seller
#[must_use]
pub fn seller() -> SellerId {
    SellerId::new(SELLER)
}

/// Buyer number `n`
#[must_use]
pub fn buyer(n: usize) -> BuyerId {
    BuyerId::new(format!("buyer-{n}"))
}

/// Contact details for buyer number `n`
#[must_use]
pub fn profile(n: usize) -> BuyerProfile {
    BuyerProfile {
        name: Some(format!("Buyer {n}")),
        email: Some(format!("buyer-{n}@example.com")),
    }
}

/// Details of an event a week after [`test_time`]
#[must_use]
pub fn event_details(capacity: u32) -> NewEvent {
    NewEvent {
        name: "Fixture Night".to_string(),
        event_date: test_time() + Duration::days(7),
        unit_price: Money::from_cents(UNIT_PRICE_CENTS),
        total_capacity: capacity,
        payout_account: Some(PAYOUT_ACCOUNT.to_string()),
    }
}

/// `EventCreated` for a fresh event
#[must_use]
pub fn event_created(capacity: u32) -> LedgerEvent {
    let details = event_details(capacity);
    LedgerEvent::EventCreated {
        event: Event {
            id: EventId::new(),
            seller_id: seller(),
            name: details.name,
            event_date: details.event_date,
            unit_price: details.unit_price,
            total_capacity: details.total_capacity,
            payout_account: details.payout_account,
            is_cancelled: false,
            created_at: test_time(),
        },
    }
}

/// `BuyerJoined` at [`test_time`]
#[must_use]
pub fn buyer_joined(entry_id: EntryId, buyer_id: &str) -> LedgerEvent {
    LedgerEvent::BuyerJoined {
        entry_id,
        buyer_id: BuyerId::new(buyer_id),
        joined_at: test_time(),
    }
}

/// `OfferGranted` expiring `ttl` after [`test_time`]
#[must_use]
pub fn offer_granted(entry_id: EntryId, ttl: Duration) -> LedgerEvent {
    LedgerEvent::OfferGranted {
        entry_id,
        expires_at: test_time() + ttl,
    }
}

/// Checkout settings matching the production defaults
#[must_use]
pub fn checkout_settings() -> CheckoutSettings {
    CheckoutSettings {
        fees: FeeSchedule::default(),
        platform_fee_per_ticket: Money::from_cents(100),
        currency: "cad".to_string(),
        public_base_url: "https://tickets.example.com".to_string(),
    }
}

/// A box office wired to in-memory collaborators, with handles to each.
#[derive(Clone, Debug)]
pub struct TestBoxOffice {
    /// Service under test
    pub office: BoxOffice,
    /// Processor the service calls
    pub processor: RecordingPaymentProcessor,
    /// Store the service writes to
    pub store: FlakyLedgerStore,
    /// Clock the service reads
    pub clock: ManualClock,
}

/// A box office at [`test_time`] with default policy and pricing
#[must_use]
pub fn box_office() -> TestBoxOffice {
    box_office_with_policy(SalesPolicy::default())
}

/// A box office at [`test_time`] with `policy`
#[must_use]
pub fn box_office_with_policy(policy: SalesPolicy) -> TestBoxOffice {
    let clock = test_clock();
    let processor = RecordingPaymentProcessor::new();
    let store = FlakyLedgerStore::new(Arc::new(InMemoryLedgerStore::new()));
    let office = BoxOffice::new(
        Arc::new(store.clone()),
        Arc::new(processor.clone()),
        Arc::new(clock.clone()),
        policy,
        checkout_settings(),
    );
    TestBoxOffice {
        office,
        processor,
        store,
        clock,
    }
}

impl TestBoxOffice {
    /// Creates a fixture event
    pub async fn create_event(&self, capacity: u32) -> EventId {
        self.office
            .create_event(seller(), event_details(capacity))
            .await
            .unwrap()
            .id
    }

    /// Starts a checkout for buyer `n`, naming every attendee
    pub async fn checkout(&self, event_id: EventId, n: usize, quantity: u32) -> CheckoutSession {
        self.office
            .create_checkout_session(CheckoutRequest {
                event_id,
                buyer_id: buyer(n),
                quantity,
                attendee_names: Some(
                    (1..=quantity)
                        .map(|i| format!("Guest {n}.{i}"))
                        .collect(),
                ),
                buyer: profile(n),
            })
            .await
            .unwrap()
    }

    /// Pays a session and lands buyer `n` on the success page
    pub async fn pay_and_confirm(
        &self,
        event_id: EventId,
        n: usize,
        session: &CheckoutSession,
        quantity: u32,
    ) -> Vec<Ticket> {
        self.processor
            .complete_session(&session.session_id)
            .await
            .unwrap();
        self.office
            .confirm_checkout_success(&buyer(n), event_id, &session.session_id, Some(quantity))
            .await
            .unwrap()
            .tickets
    }
}
