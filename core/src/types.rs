//! Domain types for the box office.
//!
//! Identifiers, money, and the three persisted records: [`Event`],
//! [`WaitingListEntry`] and [`Ticket`].

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Unique identifier for a waiting-list entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random `EntryId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EntryId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Unique identifier for a ticket (the value encoded in the ticket's QR code)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Buyer identity as issued by the external identity provider
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuyerId(String);

impl BuyerId {
    /// Wraps a provider-issued user id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seller identity as issued by the external identity provider
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerId(String);

impl SellerId {
    /// Wraps a provider-issued user id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processor charge identifier; one reference produces at most one issuance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    /// Wraps a processor charge id
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the raw reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in minor currency units (cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two money amounts, clamping at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event with a fixed number of admissions for sale
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: EventId,
    /// Seller who owns the event (and may scan its tickets)
    pub seller_id: SellerId,
    /// Display name
    pub name: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Price of one admission
    pub unit_price: Money,
    /// Total admissions for sale
    pub total_capacity: u32,
    /// Seller's connected processor account (split-payment destination)
    pub payout_account: Option<String>,
    /// Cancellation is monotonic
    pub is_cancelled: bool,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Last instant at which tickets can be sold: end of the event's calendar day (UTC)
    #[must_use]
    pub fn sales_deadline(&self) -> DateTime<Utc> {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).map_or(self.event_date, |end_of_day| {
            self.event_date.date_naive().and_time(end_of_day).and_utc()
        })
    }

    /// Whether ticket sales have closed at `now`
    #[must_use]
    pub fn sales_closed(&self, now: DateTime<Utc>) -> bool {
        now > self.sales_deadline()
    }

    /// Whether `seller_id` owns this event
    #[must_use]
    pub fn is_owned_by(&self, seller_id: &SellerId) -> bool {
        &self.seller_id == seller_id
    }
}

// ============================================================================
// Waiting list
// ============================================================================

/// Waiting-list entry status
///
/// `waiting → offered → {purchased | expired | cancelled}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Queued behind other buyers
    Waiting,
    /// Holding a time-boxed right to purchase
    Offered,
    /// Offer converted into tickets
    Purchased,
    /// Offer lapsed
    Expired,
    /// Offer released by the buyer
    Cancelled,
}

impl EntryStatus {
    /// Terminal states are retained for audit and never left
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Purchased | Self::Expired | Self::Cancelled)
    }
}

/// A buyer's position/state record for one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    /// Unique entry identifier
    pub id: EntryId,
    /// Event this entry queues for
    pub event_id: EventId,
    /// Buyer holding the entry
    pub buyer_id: BuyerId,
    /// Stored status (see [`crate::ledger::EventLedger::effective_status`] for the lazy view)
    pub status: EntryStatus,
    /// When the buyer joined
    pub joined_at: DateTime<Utc>,
    /// Set only once the entry is offered
    pub offer_expires_at: Option<DateTime<Utc>>,
}

impl WaitingListEntry {
    /// Whether this entry is an offer that has lapsed at `now` (stored or not)
    #[must_use]
    pub fn offer_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Offered
            && self.offer_expires_at.is_none_or(|expires_at| now >= expires_at)
    }

    /// Status as observed at `now`: stale offers read as expired
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> EntryStatus {
        if self.offer_lapsed(now) {
            EntryStatus::Expired
        } else {
            self.status
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Redeemable
    Valid,
    /// Redeemed at check-in
    Used,
    /// Refunded by an external flow
    Refunded,
    /// Voided with the event
    Cancelled,
}

impl TicketStatus {
    /// Valid and used tickets both count as admissions against capacity
    #[must_use]
    pub const fn is_admission(self) -> bool {
        matches!(self, Self::Valid | Self::Used)
    }
}

/// Buyer contact details captured at checkout
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerProfile {
    /// Display name
    pub name: Option<String>,
    /// E-mail address
    pub email: Option<String>,
}

/// Attendee display info returned on a successful check-in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeInfo {
    /// Buyer's display name
    pub buyer_name: Option<String>,
    /// Buyer's e-mail
    pub buyer_email: Option<String>,
    /// Name printed on the ticket
    pub attendee_name: Option<String>,
}

impl From<&Ticket> for AttendeeInfo {
    fn from(ticket: &Ticket) -> Self {
        Self {
            buyer_name: ticket.buyer.name.clone(),
            buyer_email: ticket.buyer.email.clone(),
            attendee_name: ticket.attendee_name.clone(),
        }
    }
}

/// One redeemable admission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,
    /// Event admitted to
    pub event_id: EventId,
    /// Buyer who paid
    pub buyer_id: BuyerId,
    /// Name of the person admitted (required for multi-ticket orders)
    pub attendee_name: Option<String>,
    /// Buyer contact details
    pub buyer: BuyerProfile,
    /// Current status
    pub status: TicketStatus,
    /// When the payment was reconciled
    pub purchased_at: DateTime<Utc>,
    /// Processor charge that paid for this ticket
    pub payment_reference: PaymentReference,
    /// This ticket's share of the amount paid
    pub amount_paid: Money,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_on(date: DateTime<Utc>) -> Event {
        Event {
            id: EventId::new(),
            seller_id: SellerId::new("seller"),
            name: "Show".to_string(),
            event_date: date,
            unit_price: Money::from_cents(2500),
            total_capacity: 10,
            payout_account: None,
            is_cancelled: false,
            created_at: date,
        }
    }

    #[test]
    fn sales_close_at_end_of_event_day() {
        let event = event_on(Utc.with_ymd_and_hms(2025, 3, 14, 19, 30, 0).unwrap());

        assert!(!event.sales_closed(Utc.with_ymd_and_hms(2025, 3, 14, 23, 59, 59).unwrap()));
        assert!(event.sales_closed(Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()));
    }

    #[test]
    fn stale_offer_reads_as_expired() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let entry = WaitingListEntry {
            id: EntryId::new(),
            event_id: EventId::new(),
            buyer_id: BuyerId::new("buyer"),
            status: EntryStatus::Offered,
            joined_at: now,
            offer_expires_at: Some(now),
        };

        assert_eq!(entry.status_at(now), EntryStatus::Expired);
        assert_eq!(
            entry.status_at(now - chrono::Duration::seconds(1)),
            EntryStatus::Offered
        );
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(10_330).to_string(), "103.30");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
    }
}
