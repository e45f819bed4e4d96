//! Business metrics for the box office.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_events_created_total` - Events created
//! - `boxoffice_waitlist_joins_total` - Buyers entering a waiting list
//! - `boxoffice_offers_total{status}` - Offers granted, expired, released
//! - `boxoffice_checkout_sessions_total` - Payment sessions created
//! - `boxoffice_reconciliations_total{source, outcome}` - Payments reconciled
//! - `boxoffice_tickets_issued_total` - Tickets issued
//! - `boxoffice_check_ins_total{outcome}` - Scans by outcome
//! - `boxoffice_ledger_conflicts_total` - Optimistic appends retried
//!
//! ## Histograms
//! - `boxoffice_reconciliation_duration_seconds` - Time to reconcile one payment

use metrics::{describe_counter, describe_histogram};

/// Initialize and register all business metrics descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!("boxoffice_events_created_total", "Total number of events created");
    describe_counter!(
        "boxoffice_waitlist_joins_total",
        "Total number of buyers entering a waiting list"
    );
    describe_counter!(
        "boxoffice_offers_total",
        "Total number of offers by status (granted, expired, released)"
    );
    describe_counter!(
        "boxoffice_checkout_sessions_total",
        "Total number of payment sessions created"
    );
    describe_counter!(
        "boxoffice_reconciliations_total",
        "Total number of payment reconciliations by source and outcome"
    );
    describe_histogram!(
        "boxoffice_reconciliation_duration_seconds",
        "Time taken to reconcile one payment"
    );
    describe_counter!("boxoffice_tickets_issued_total", "Total number of tickets issued");
    describe_counter!(
        "boxoffice_check_ins_total",
        "Total number of check-in scans by outcome"
    );
    describe_counter!(
        "boxoffice_ledger_conflicts_total",
        "Total number of ledger appends retried after a concurrent write"
    );

    tracing::info!("Business metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record an event created.
pub fn record_event_created() {
    metrics::counter!("boxoffice_events_created_total").increment(1);
}

/// Record a buyer joining a waiting list.
pub fn record_waitlist_join() {
    metrics::counter!("boxoffice_waitlist_joins_total").increment(1);
}

/// Record offer transitions.
///
/// # Arguments
///
/// * `status` - `granted`, `expired` or `released`
/// * `count` - Number of offers
pub fn record_offers(status: &'static str, count: usize) {
    if count > 0 {
        metrics::counter!("boxoffice_offers_total", "status" => status).increment(count as u64);
        tracing::debug!(status, count, "Recorded offers metric");
    }
}

/// Record a payment session created.
pub fn record_checkout_session() {
    metrics::counter!("boxoffice_checkout_sessions_total").increment(1);
}

/// Record a reconciled payment.
///
/// # Arguments
///
/// * `source` - Which path delivered the payment
/// * `outcome` - Reconciliation outcome label
/// * `tickets` - Tickets issued by this call
/// * `duration_secs` - Time taken
pub fn record_reconciliation(
    source: &'static str,
    outcome: &'static str,
    tickets: usize,
    duration_secs: f64,
) {
    metrics::counter!("boxoffice_reconciliations_total", "source" => source, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("boxoffice_reconciliation_duration_seconds").record(duration_secs);
    if tickets > 0 {
        metrics::counter!("boxoffice_tickets_issued_total").increment(tickets as u64);
    }
    tracing::debug!(source, outcome, tickets, duration_secs, "Recorded reconciliation metric");
}

/// Record a check-in scan.
pub fn record_check_in(outcome: &'static str) {
    metrics::counter!("boxoffice_check_ins_total", "outcome" => outcome).increment(1);
}

/// Record an append retried after a concurrent write.
pub fn record_ledger_conflict() {
    metrics::counter!("boxoffice_ledger_conflicts_total").increment(1);
}
