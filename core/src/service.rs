//! The box office facade.
//!
//! [`BoxOffice`] is the single entry point the presentation layer talks to.
//! Every operation takes the caller's identity explicitly; ownership checks
//! happen here or inside the reducers, never in the transport.

use crate::aggregates::{
    CheckInAction, CheckInOutcome, CheckInReducer, EventAction, EventError, EventReducer,
    NewEvent, WaitlistAction, WaitlistOutput, WaitlistReducer,
};
use crate::checkout::{CheckoutOrchestrator, CheckoutRequest, CheckoutSettings};
use crate::config::Config;
use crate::environment::Clock;
use crate::error::BoxOfficeError;
use crate::fees::ChargeBreakdown;
use crate::ledger::{Attendee, EventLedger, QueuePosition, SalesSummary};
use crate::payment_processor::PaymentProcessor;
use crate::reconciliation::{
    PaymentCompletion, PaymentSource, PaymentWebhookEvent, ReconcileOutcome, Reconciler,
};
use crate::reducer::{LedgerEnvironment, SalesPolicy};
use crate::store::{DispatchError, LedgerRepository, LedgerStore};
use crate::types::{BuyerId, EntryId, Event, EventId, Money, SellerId, Ticket, TicketId};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result type for facade operations
pub type Result<T> = std::result::Result<T, BoxOfficeError>;

/// Where a buyer is sent when a purchase cannot be shown.
pub const NEUTRAL_REDIRECT: &str = "/";

/// Events swept at once by [`BoxOffice::sweep_expired_offers`].
const SWEEP_CONCURRENCY: usize = 8;

/// Public availability of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// Event
    pub event_id: EventId,
    /// Capacity the event was created with
    pub total_capacity: u32,
    /// Capacity neither sold nor held by a live offer
    pub remaining_tickets: u32,
    /// Price of one admission
    pub unit_price: Money,
    /// Event was cancelled
    pub is_cancelled: bool,
    /// Sales deadline has passed
    pub sales_closed: bool,
}

/// A created checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Processor session id
    pub session_id: String,
    /// Hosted payment page
    pub session_url: String,
    /// Entry holding the offer
    pub entry_id: EntryId,
    /// What the buyer will be charged
    pub breakdown: ChargeBreakdown,
}

/// What the success page shows after a checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfirmation {
    /// The purchase's tickets, newest first
    pub tickets: Vec<Ticket>,
    /// Set when there is nothing to show and the buyer should be moved on
    pub redirect_to: Option<String>,
}

impl CheckoutConfirmation {
    fn redirect() -> Self {
        Self {
            tickets: Vec::new(),
            redirect_to: Some(NEUTRAL_REDIRECT.to_string()),
        }
    }
}

/// Result of an eager expiry sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Events visited
    pub events: usize,
    /// Lapsed offers recorded as expired
    pub expired: usize,
    /// Offers granted to waiting buyers
    pub promoted: usize,
}

/// Box office service.
#[derive(Clone)]
pub struct BoxOffice {
    repository: LedgerRepository,
    processor: Arc<dyn PaymentProcessor>,
    checkout: CheckoutOrchestrator,
    reconciler: Reconciler,
}

fn dispatch_error<E: Into<BoxOfficeError>>(error: DispatchError<E>) -> BoxOfficeError {
    match error {
        DispatchError::EventNotFound(event_id) => BoxOfficeError::EventNotFound(event_id),
        DispatchError::Rejected(error) => error.into(),
        DispatchError::Store(error) => BoxOfficeError::Store(error),
        DispatchError::Contention { event_id, .. } => BoxOfficeError::Contention(event_id),
    }
}

impl BoxOffice {
    /// Creates a box office over `store` and `processor`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
        policy: SalesPolicy,
        settings: CheckoutSettings,
    ) -> Self {
        let repository = LedgerRepository::new(store, LedgerEnvironment::new(clock, policy));
        Self {
            reconciler: Reconciler::new(repository.clone(), processor.clone()),
            checkout: CheckoutOrchestrator::new(settings, policy),
            repository,
            processor,
        }
    }

    /// Creates a box office configured from `config`.
    #[must_use]
    pub fn from_config(
        config: &Config,
        store: Arc<dyn LedgerStore>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            store,
            processor,
            clock,
            config.sales_policy(),
            config.checkout_settings(),
        )
    }

    /// Current time on the injected clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.repository.env().now()
    }

    /// Underlying repository
    #[must_use]
    pub const fn repository(&self) -> &LedgerRepository {
        &self.repository
    }

    async fn ledger(&self, event_id: EventId) -> Result<EventLedger> {
        self.repository
            .load(event_id)
            .await?
            .ok_or(BoxOfficeError::EventNotFound(event_id))
    }

    async fn owned_ledger(&self, event_id: EventId, seller_id: &SellerId) -> Result<EventLedger> {
        let ledger = self.ledger(event_id).await?;
        match ledger.event() {
            Some(event) if event.is_owned_by(seller_id) => Ok(ledger),
            _ => Err(BoxOfficeError::Forbidden(event_id)),
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Creates an event owned by `seller_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Event`] if the details are invalid.
    pub async fn create_event(&self, seller_id: SellerId, details: NewEvent) -> Result<Event> {
        let event_id = EventId::new();
        let event = self
            .repository
            .dispatch_new(
                event_id,
                &EventReducer,
                EventAction::Create {
                    event_id,
                    seller_id,
                    details,
                },
            )
            .await
            .map_err(dispatch_error)?;

        crate::metrics::record_event_created();
        info!(%event_id, seller_id = %event.seller_id, capacity = event.total_capacity, "Event created");
        Ok(event)
    }

    /// Cancels an event. Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::EventNotFound`] if the event does not exist
    /// - [`BoxOfficeError::Forbidden`] if the caller is not the seller
    pub async fn cancel_event(&self, event_id: EventId, seller_id: SellerId) -> Result<Event> {
        let event = self
            .repository
            .dispatch(event_id, &EventReducer, EventAction::Cancel { seller_id })
            .await
            .map_err(|error| match error {
                DispatchError::Rejected(EventError::NotOwner) => BoxOfficeError::Forbidden(event_id),
                DispatchError::Rejected(EventError::NotFound) => BoxOfficeError::EventNotFound(event_id),
                other => dispatch_error(other),
            })?;

        info!(%event_id, "Event cancelled");
        Ok(event)
    }

    /// Reads an event.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::EventNotFound`] if the event does not exist.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        let ledger = self.ledger(event_id).await?;
        ledger
            .event()
            .cloned()
            .ok_or(BoxOfficeError::EventNotFound(event_id))
    }

    /// Remaining capacity and sale state.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::EventNotFound`] if the event does not exist.
    pub async fn get_availability(&self, event_id: EventId) -> Result<Availability> {
        let ledger = self.ledger(event_id).await?;
        let now = self.now();
        let event = ledger
            .event()
            .ok_or(BoxOfficeError::EventNotFound(event_id))?;
        Ok(Availability {
            event_id,
            total_capacity: event.total_capacity,
            remaining_tickets: ledger.remaining_capacity(now),
            unit_price: event.unit_price,
            is_cancelled: event.is_cancelled,
            sales_closed: event.sales_closed(now),
        })
    }

    // ========================================================================
    // Waiting list
    // ========================================================================

    /// Grants offers to waiting buyers while capacity remains.
    async fn promote(&self, event_id: EventId) -> Result<Vec<EntryId>> {
        let output = self
            .repository
            .dispatch(event_id, &WaitlistReducer, WaitlistAction::Promote)
            .await
            .map_err(dispatch_error)?;
        let promoted = match output {
            WaitlistOutput::Entries(ids) => ids,
            WaitlistOutput::Entry(_) => Vec::new(),
        };
        if !promoted.is_empty() {
            crate::metrics::record_offers("granted", promoted.len());
            info!(%event_id, offers = promoted.len(), "Offers granted");
        }
        Ok(promoted)
    }

    /// Joins the waiting list, then promotes if capacity is free.
    ///
    /// Joining again while waiting or holding a live offer returns the
    /// existing entry.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::EventNotFound`] if the event does not exist
    /// - [`BoxOfficeError::Waitlist`] if the event is cancelled or sales have closed
    pub async fn join_waitlist(&self, event_id: EventId, buyer_id: BuyerId) -> Result<QueuePosition> {
        let started = self.now();
        let output = self
            .repository
            .dispatch(
                event_id,
                &WaitlistReducer,
                WaitlistAction::Join {
                    buyer_id: buyer_id.clone(),
                },
            )
            .await
            .map_err(dispatch_error)?;
        if let WaitlistOutput::Entry(entry) = &output {
            if entry.joined_at >= started {
                crate::metrics::record_waitlist_join();
                info!(%event_id, %buyer_id, entry_id = %entry.id, "Buyer joined waiting list");
            }
        }

        self.promote(event_id).await?;
        self.queue_position_after_promotion(event_id, &buyer_id).await
    }

    /// The buyer's current queue status.
    ///
    /// Lapsed offers are read as expired; if that frees capacity the next
    /// waiting buyers are promoted before answering.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::EventNotFound`] if the event does not exist.
    pub async fn get_queue_position(
        &self,
        event_id: EventId,
        buyer_id: &BuyerId,
    ) -> Result<Option<QueuePosition>> {
        let ledger = self.ledger(event_id).await?;
        if ledger.promotion_due(self.now()) {
            self.promote(event_id).await?;
            let ledger = self.ledger(event_id).await?;
            return Ok(ledger.queue_position(buyer_id, self.now()));
        }
        Ok(ledger.queue_position(buyer_id, self.now()))
    }

    async fn queue_position_after_promotion(
        &self,
        event_id: EventId,
        buyer_id: &BuyerId,
    ) -> Result<QueuePosition> {
        let ledger = self.ledger(event_id).await?;
        ledger
            .queue_position(buyer_id, self.now())
            .ok_or(BoxOfficeError::EventNotFound(event_id))
    }

    /// Gives back the buyer's live offer and promotes the next buyer.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Waitlist`] if the buyer holds no live offer.
    pub async fn release_offer(&self, event_id: EventId, buyer_id: BuyerId) -> Result<QueuePosition> {
        let ledger = self.ledger(event_id).await?;
        let entry_id = ledger
            .active_entry_for_buyer(&buyer_id, self.now())
            .or_else(|| ledger.entry_for_buyer(&buyer_id))
            .map(|entry| entry.id)
            .ok_or(crate::aggregates::WaitlistError::NoActiveOffer)?;

        self.repository
            .dispatch(
                event_id,
                &WaitlistReducer,
                WaitlistAction::Release {
                    buyer_id: buyer_id.clone(),
                    entry_id,
                },
            )
            .await
            .map_err(dispatch_error)?;
        crate::metrics::record_offers("released", 1);
        info!(%event_id, %buyer_id, %entry_id, "Offer released");

        self.promote(event_id).await?;
        self.queue_position_after_promotion(event_id, &buyer_id).await
    }

    /// Records lapsed offers as expired and promotes waiting buyers, across
    /// every event.
    ///
    /// Pure hygiene: expiry is already derived on every read. Failures on one
    /// event are logged and the sweep moves on.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Store`] if the event list cannot be read.
    pub async fn sweep_expired_offers(&self) -> Result<SweepReport> {
        let event_ids = self.repository.store().event_ids().await?;
        let mut report = SweepReport {
            events: event_ids.len(),
            ..SweepReport::default()
        };
        let swept: Vec<(usize, usize)> = stream::iter(event_ids)
            .map(|event_id| self.sweep_event(event_id))
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;
        for (expired, promoted) in swept {
            report.expired += expired;
            report.promoted += promoted;
        }
        Ok(report)
    }

    /// Expires and promotes one event; returns `(expired, promoted)`.
    async fn sweep_event(&self, event_id: EventId) -> (usize, usize) {
        let expired = match self
            .repository
            .dispatch(event_id, &WaitlistReducer, WaitlistAction::ExpireOffers)
            .await
        {
            Ok(WaitlistOutput::Entries(ids)) => {
                crate::metrics::record_offers("expired", ids.len());
                ids.len()
            }
            Ok(WaitlistOutput::Entry(_)) => 0,
            Err(error) => {
                warn!(%event_id, %error, "Offer sweep skipped event");
                return (0, 0);
            }
        };
        match self.promote(event_id).await {
            Ok(promoted) => (expired, promoted.len()),
            Err(error) => {
                warn!(%event_id, %error, "Promotion after sweep failed");
                (expired, 0)
            }
        }
    }

    // ========================================================================
    // Checkout and payments
    // ========================================================================

    /// Creates a hosted payment session for the buyer's live offer.
    ///
    /// Validates against a fresh ledger snapshot and writes nothing; the
    /// processor is called with no ledger state held.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::Checkout`] if a precondition fails
    /// - [`BoxOfficeError::Processor`] if the processor refuses the session
    pub async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let ledger = self.ledger(request.event_id).await?;
        let plan = self.checkout.plan(&ledger, &request, self.now())?;
        drop(ledger);

        let session = self.processor.create_session(plan.session).await?;
        crate::metrics::record_checkout_session();
        info!(
            event_id = %request.event_id,
            buyer_id = %request.buyer_id,
            quantity = request.quantity,
            total = %plan.breakdown.total,
            session_id = %session.session_id,
            "Checkout session created"
        );

        Ok(CheckoutSession {
            session_id: session.session_id,
            session_url: session.url,
            entry_id: plan.entry_id,
            breakdown: plan.breakdown,
        })
    }

    /// Handles a verified payment event pushed by the processor.
    ///
    /// Returns `None` for event types that carry no payment.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Reconcile`]; validation failures must not be
    /// redelivered, anything else may be.
    pub async fn handle_payment_event(
        &self,
        event: PaymentWebhookEvent,
    ) -> Result<Option<ReconcileOutcome>> {
        let event_type = event.event_type.clone();
        let Some(completion) = event.into_completion()? else {
            info!(event_type, "Ignoring payment event");
            return Ok(None);
        };
        let outcome = self.reconciler.reconcile(completion).await.inspect_err(|error| {
            error!(event_type, %error, "Payment event could not be reconciled");
        })?;
        Ok(Some(outcome))
    }

    /// Reconciles a checkout from the success page and lists its tickets.
    ///
    /// Issues the tickets if the webhook has not yet done so. Only tickets
    /// produced by this session's payment are shown. When nothing can be
    /// shown, including a payment that lost its seat, the confirmation carries
    /// a redirect to a neutral page instead of partial state.
    ///
    /// # Errors
    ///
    /// Returns only retryable failures (store or processor unavailable); every
    /// other failure becomes a redirect.
    pub async fn confirm_checkout_success(
        &self,
        buyer_id: &BuyerId,
        event_id: EventId,
        session_id: &str,
        quantity: Option<u32>,
    ) -> Result<CheckoutConfirmation> {
        let ledger = match self.ledger(event_id).await {
            Ok(ledger) => ledger,
            Err(error) if error.is_retryable() => return Err(error),
            Err(error) => {
                warn!(%event_id, %error, "Success page for unknown event");
                return Ok(CheckoutConfirmation::redirect());
            }
        };
        let Some(account) = ledger.event().and_then(|event| event.payout_account.clone()) else {
            warn!(%event_id, "Success page for event without payout account");
            return Ok(CheckoutConfirmation::redirect());
        };
        drop(ledger);

        let details = match self.processor.retrieve_session(session_id, &account).await {
            Ok(details) => details,
            Err(error) if error.kind().is_retryable() => return Err(error.into()),
            Err(error) => {
                warn!(session_id, %error, "Checkout session could not be read");
                return Ok(CheckoutConfirmation::redirect());
            }
        };

        let outcome = match (details.paid, details.payment_reference) {
            (true, Some(payment_reference)) => {
                let completion = PaymentCompletion {
                    source: PaymentSource::SuccessPage,
                    metadata: details.metadata,
                    payment_reference,
                    amount: details.amount_total.unwrap_or(Money::ZERO),
                    session_id: Some(details.session_id),
                    connected_account: Some(account),
                };
                self.reconciler.reconcile(completion).await
            }
            (false, Some(payment_reference)) => self
                .reconciler
                .recorded_outcome(&payment_reference)
                .await
                .map(|recorded| recorded.unwrap_or(ReconcileOutcome::Unfulfilled {
                    reason: "payment not completed".to_string(),
                })),
            (_, None) => return Ok(CheckoutConfirmation::redirect()),
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) if error.kind().is_retryable() => return Err(error.into()),
            Err(error) => {
                error!(session_id, %error, "Paid checkout could not be reconciled");
                return Ok(CheckoutConfirmation::redirect());
            }
        };
        if let ReconcileOutcome::Unfulfilled { reason } = &outcome {
            warn!(session_id, %reason, "Checkout has no tickets to show");
            return Ok(CheckoutConfirmation::redirect());
        }

        let tickets: Vec<Ticket> = outcome
            .tickets()
            .iter()
            .filter(|ticket| ticket.event_id == event_id && &ticket.buyer_id == buyer_id)
            .cloned()
            .collect();
        if tickets.is_empty() {
            warn!(session_id, %buyer_id, "Checkout tickets belong to another buyer or event");
            return Ok(CheckoutConfirmation::redirect());
        }
        if let Some(expected) = quantity.filter(|&expected| expected as usize != tickets.len()) {
            warn!(session_id, expected, shown = tickets.len(), "Success page quantity differs from issued tickets");
        }
        Ok(CheckoutConfirmation {
            tickets,
            redirect_to: None,
        })
    }

    // ========================================================================
    // Tickets and check-in
    // ========================================================================

    /// Redeems a scanned ticket at `event_id`'s door.
    ///
    /// Never fails on the ticket itself; every scan ends in one of the
    /// [`CheckInOutcome`] variants.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Store`] or [`BoxOfficeError::Contention`] only.
    pub async fn check_in(
        &self,
        event_id: EventId,
        ticket_id: TicketId,
        seller_id: SellerId,
    ) -> Result<CheckInOutcome> {
        let outcome = match self.repository.store().locate_ticket(ticket_id).await? {
            None => CheckInOutcome::Invalid,
            Some(ticket_event) if ticket_event != event_id => CheckInOutcome::WrongEvent,
            Some(_) => match self
                .repository
                .dispatch(
                    event_id,
                    &CheckInReducer,
                    CheckInAction {
                        ticket_id,
                        seller_id,
                    },
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(DispatchError::EventNotFound(_)) => CheckInOutcome::Invalid,
                Err(other) => return Err(dispatch_error(other)),
            },
        };

        crate::metrics::record_check_in(outcome.label());
        info!(%event_id, %ticket_id, outcome = outcome.label(), "Ticket scanned");
        Ok(outcome)
    }

    /// Every ticket the buyer holds, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Store`] if the store fails.
    pub async fn list_user_tickets(&self, buyer_id: &BuyerId) -> Result<Vec<Ticket>> {
        Ok(self.repository.store().tickets_for_buyer(buyer_id).await?)
    }

    /// One of the buyer's tickets.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::TicketNotFound`] if the ticket does not exist
    /// or belongs to someone else.
    pub async fn get_ticket(&self, buyer_id: &BuyerId, ticket_id: TicketId) -> Result<Ticket> {
        let event_id = self
            .repository
            .store()
            .locate_ticket(ticket_id)
            .await?
            .ok_or(BoxOfficeError::TicketNotFound(ticket_id))?;
        let ledger = self.ledger(event_id).await?;
        ledger
            .ticket(ticket_id)
            .filter(|ticket| &ticket.buyer_id == buyer_id)
            .cloned()
            .ok_or(BoxOfficeError::TicketNotFound(ticket_id))
    }

    /// Valid and used tickets of the seller's event.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Forbidden`] if the caller is not the seller.
    pub async fn list_attendees(&self, event_id: EventId, seller_id: &SellerId) -> Result<Vec<Attendee>> {
        Ok(self.owned_ledger(event_id, seller_id).await?.attendees())
    }

    /// Sales counters for the seller's event.
    ///
    /// # Errors
    ///
    /// Returns [`BoxOfficeError::Forbidden`] if the caller is not the seller.
    pub async fn sales_summary(&self, event_id: EventId, seller_id: &SellerId) -> Result<SalesSummary> {
        let ledger = self.owned_ledger(event_id, seller_id).await?;
        Ok(ledger.sales_summary(self.now()))
    }
}

impl std::fmt::Debug for BoxOffice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxOffice")
            .field("repository", &self.repository)
            .field("checkout", &self.checkout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::environment::FixedClock;
    use crate::fees::FeeSchedule;
    use crate::payment_processor::MockPaymentProcessor;
    use crate::store::InMemoryLedgerStore;
    use crate::types::{BuyerProfile, EntryStatus};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()
    }

    fn box_office() -> (BoxOffice, MockPaymentProcessor) {
        let processor = MockPaymentProcessor::new();
        let office = BoxOffice::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(processor.clone()),
            Arc::new(FixedClock::new(now())),
            SalesPolicy::default(),
            CheckoutSettings {
                fees: FeeSchedule::default(),
                platform_fee_per_ticket: Money::from_cents(100),
                currency: "cad".to_string(),
                public_base_url: "https://tickets.example.com".to_string(),
            },
        );
        (office, processor)
    }

    async fn event(office: &BoxOffice, capacity: u32) -> EventId {
        office
            .create_event(
                SellerId::new("seller"),
                NewEvent {
                    name: "Matinee".to_string(),
                    event_date: now() + Duration::days(7),
                    unit_price: Money::from_cents(10_000),
                    total_capacity: capacity,
                    payout_account: Some("acct_seller".to_string()),
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_join_promotes_while_capacity_remains() {
        let (office, _) = box_office();
        let event_id = event(&office, 1).await;

        let first = office.join_waitlist(event_id, BuyerId::new("a")).await.unwrap();
        let second = office.join_waitlist(event_id, BuyerId::new("b")).await.unwrap();

        assert_eq!(first.status, EntryStatus::Offered);
        assert!(first.purchasable);
        assert_eq!(second.status, EntryStatus::Waiting);
        assert_eq!(second.position, Some(1));
        assert_eq!(office.get_availability(event_id).await.unwrap().remaining_tickets, 0);
    }

    #[tokio::test]
    async fn test_release_hands_offer_to_next_buyer() {
        let (office, _) = box_office();
        let event_id = event(&office, 1).await;
        office.join_waitlist(event_id, BuyerId::new("a")).await.unwrap();
        office.join_waitlist(event_id, BuyerId::new("b")).await.unwrap();

        let released = office.release_offer(event_id, BuyerId::new("a")).await.unwrap();
        let next = office
            .get_queue_position(event_id, &BuyerId::new("b"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(released.status, EntryStatus::Cancelled);
        assert_eq!(next.status, EntryStatus::Offered);
    }

    #[tokio::test]
    async fn test_checkout_then_success_page_issues_tickets() {
        let (office, processor) = box_office();
        let event_id = event(&office, 5).await;
        let buyer = BuyerId::new("a");
        office.join_waitlist(event_id, buyer.clone()).await.unwrap();

        let session = office
            .create_checkout_session(CheckoutRequest {
                event_id,
                buyer_id: buyer.clone(),
                quantity: 1,
                attendee_names: None,
                buyer: BuyerProfile::default(),
            })
            .await
            .unwrap();
        assert_eq!(session.breakdown.total, Money::from_cents(10_433));

        let unpaid = office
            .confirm_checkout_success(&buyer, event_id, &session.session_id, Some(1))
            .await
            .unwrap();
        assert_eq!(unpaid.redirect_to.as_deref(), Some(NEUTRAL_REDIRECT));

        processor.complete_session(&session.session_id).await.unwrap();
        let paid = office
            .confirm_checkout_success(&buyer, event_id, &session.session_id, Some(1))
            .await
            .unwrap();
        assert_eq!(paid.tickets.len(), 1);
        assert_eq!(paid.redirect_to, None);

        let again = office
            .confirm_checkout_success(&buyer, event_id, &session.session_id, Some(1))
            .await
            .unwrap();
        assert_eq!(again.tickets, paid.tickets);
        assert_eq!(office.list_user_tickets(&buyer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attendees_are_seller_only() {
        let (office, _) = box_office();
        let event_id = event(&office, 5).await;

        let result = office
            .list_attendees(event_id, &SellerId::new("someone-else"))
            .await;
        assert!(matches!(result, Err(BoxOfficeError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_unknown_ticket_scans_invalid() {
        let (office, _) = box_office();
        let event_id = event(&office, 5).await;

        let outcome = office
            .check_in(event_id, TicketId::new(), SellerId::new("seller"))
            .await
            .unwrap();
        assert_eq!(outcome, CheckInOutcome::Invalid);
    }
}
