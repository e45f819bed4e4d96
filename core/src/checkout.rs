//! Checkout orchestration.
//!
//! Turns a live offer into a hosted payment session. Nothing here writes to
//! the ledger: the plan is built from a fresh snapshot, and capacity is only
//! consumed when the payment is reconciled.
//!
//! The session's metadata is the only link between the processor's payment
//! and the purchase. It is a flat, versioned string map:
//!
//! | key                 | value                              | on decode      |
//! |---------------------|------------------------------------|----------------|
//! | `metadata_version`  | `1`                                | missing → `1`  |
//! | `event_id`          | event UUID                         | required       |
//! | `buyer_id`          | buyer id                           | required       |
//! | `waitlist_entry_id` | entry UUID                         | required       |
//! | `quantity`          | decimal                            | optional       |
//! | `attendee_names`    | JSON array of strings, or empty    | optional       |
//! | `buyer_name`        | display name                       | optional       |
//! | `buyer_email`       | e-mail                             | optional       |

use crate::error::ErrorKind;
use crate::fees::{self, ChargeBreakdown, FeeError, FeeSchedule};
use crate::ledger::EventLedger;
use crate::payment_processor::{LineItem, Metadata, PaymentSessionRequest, ProcessorError};
use crate::reducer::SalesPolicy;
use crate::types::{BuyerId, BuyerProfile, EntryId, EntryStatus, EventId, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Current metadata layout.
pub const METADATA_VERSION: &str = "1";

/// Name of the line item carrying platform and processing fees.
pub const FEE_LINE_ITEM_NAME: &str = "Service fees";

const FEE_LINE_ITEM_DESCRIPTION: &str = "Service and processing fees";

/// Metadata keys.
pub mod keys {
    /// Layout version
    pub const VERSION: &str = "metadata_version";
    /// Event id
    pub const EVENT_ID: &str = "event_id";
    /// Buyer id
    pub const BUYER_ID: &str = "buyer_id";
    /// Waiting-list entry id
    pub const ENTRY_ID: &str = "waitlist_entry_id";
    /// Quantity
    pub const QUANTITY: &str = "quantity";
    /// Attendee names (JSON array)
    pub const ATTENDEE_NAMES: &str = "attendee_names";
    /// Buyer display name
    pub const BUYER_NAME: &str = "buyer_name";
    /// Buyer e-mail
    pub const BUYER_EMAIL: &str = "buyer_email";
}

// ============================================================================
// Metadata
// ============================================================================

/// Metadata decode failures. Only the identifying fields can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Required field absent or blank
    #[error("checkout metadata is missing `{0}`")]
    Missing(&'static str),

    /// Required field present but unparseable
    #[error("checkout metadata field `{field}` is invalid: {value:?}")]
    Invalid {
        /// Field
        field: &'static str,
        /// Raw value
        value: String,
    },

    /// Written by a newer layout
    #[error("unsupported checkout metadata version {0:?}")]
    UnsupportedVersion(String),
}

impl MetadataError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Purchase details carried through the payment processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    /// Event
    pub event_id: EventId,
    /// Buyer
    pub buyer_id: BuyerId,
    /// Entry holding the offer
    pub entry_id: EntryId,
    /// Admissions, if readable
    pub quantity: Option<u32>,
    /// Names by ticket index, if readable
    pub attendee_names: Option<Vec<String>>,
    /// Buyer contact details
    pub buyer: BuyerProfile,
}

fn non_blank(metadata: &Metadata, key: &str) -> Option<String> {
    metadata
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required<T: std::str::FromStr>(metadata: &Metadata, field: &'static str) -> Result<T, MetadataError> {
    let value = non_blank(metadata, field).ok_or(MetadataError::Missing(field))?;
    value
        .parse()
        .map_err(|_| MetadataError::Invalid { field, value })
}

impl CheckoutMetadata {
    /// Encodes into the flat string map sent to the processor
    #[must_use]
    pub fn encode(&self) -> Metadata {
        let names = self
            .attendee_names
            .as_ref()
            .filter(|names| !names.is_empty())
            .and_then(|names| serde_json::to_string(names).ok())
            .unwrap_or_default();

        Metadata::from([
            (keys::VERSION.to_string(), METADATA_VERSION.to_string()),
            (keys::EVENT_ID.to_string(), self.event_id.to_string()),
            (keys::BUYER_ID.to_string(), self.buyer_id.to_string()),
            (keys::ENTRY_ID.to_string(), self.entry_id.to_string()),
            (
                keys::QUANTITY.to_string(),
                self.quantity.map(|q| q.to_string()).unwrap_or_default(),
            ),
            (keys::ATTENDEE_NAMES.to_string(), names),
            (
                keys::BUYER_NAME.to_string(),
                self.buyer.name.clone().unwrap_or_default(),
            ),
            (
                keys::BUYER_EMAIL.to_string(),
                self.buyer.email.clone().unwrap_or_default(),
            ),
        ])
    }

    /// Decodes processor metadata.
    ///
    /// Identifying fields fail hard. Quantity and attendee names degrade to
    /// `None`: a cosmetic field must never block issuing a paid ticket.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if an identifying field is missing or invalid,
    /// or the layout version is not understood.
    pub fn decode(metadata: &Metadata) -> Result<Self, MetadataError> {
        if let Some(version) = non_blank(metadata, keys::VERSION) {
            if version != METADATA_VERSION {
                return Err(MetadataError::UnsupportedVersion(version));
            }
        }

        let event_id = required(metadata, keys::EVENT_ID)?;
        let buyer_id = BuyerId::new(
            non_blank(metadata, keys::BUYER_ID).ok_or(MetadataError::Missing(keys::BUYER_ID))?,
        );
        let entry_id = required(metadata, keys::ENTRY_ID)?;

        let quantity = non_blank(metadata, keys::QUANTITY)
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|quantity| *quantity >= 1);

        let attendee_names = non_blank(metadata, keys::ATTENDEE_NAMES).and_then(|raw| {
            serde_json::from_str::<Vec<String>>(&raw)
                .inspect_err(|error| {
                    warn!(%error, "Ignoring undecodable attendee names in checkout metadata");
                })
                .ok()
        });

        Ok(Self {
            event_id,
            buyer_id,
            entry_id,
            quantity,
            attendee_names,
            buyer: BuyerProfile {
                name: non_blank(metadata, keys::BUYER_NAME),
                email: non_blank(metadata, keys::BUYER_EMAIL),
            },
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Checkout precondition failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// No such event
    #[error("event not found")]
    EventNotFound,

    /// Event was cancelled
    #[error("event has been cancelled")]
    EventCancelled,

    /// Sales deadline has passed
    #[error("ticket sales for this event have closed")]
    SalesClosed,

    /// Buyer holds no offer
    #[error("no valid ticket offer found")]
    NoActiveOffer,

    /// Buyer's offer has lapsed
    #[error("ticket offer has expired")]
    OfferExpired,

    /// Quantity outside `[1, max]`
    #[error("requested {requested} tickets but at most {max} are available")]
    QuantityUnavailable {
        /// Requested
        requested: u32,
        /// Current maximum
        max: u32,
    },

    /// Multi-ticket order without a name per ticket
    #[error("an attendee name is required for each of the {quantity} tickets")]
    MissingAttendeeNames {
        /// Requested
        quantity: u32,
    },

    /// Seller has no connected payout account
    #[error("the seller has not connected a payout account")]
    PayoutAccountMissing,

    /// Fee engine failed
    #[error(transparent)]
    Fee(#[from] FeeError),

    /// Processor refused the session
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

impl CheckoutError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Fee(error) => error.kind(),
            Self::Processor(error) => error.kind(),
            Self::PayoutAccountMissing => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }
}

/// A buyer's checkout request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Event
    pub event_id: EventId,
    /// Buyer
    pub buyer_id: BuyerId,
    /// Admissions wanted
    pub quantity: u32,
    /// One name per admission, required when `quantity > 1`
    pub attendee_names: Option<Vec<String>>,
    /// Buyer contact details, carried onto the tickets
    pub buyer: BuyerProfile,
}

/// A validated checkout ready to send to the processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutPlan {
    /// Entry holding the offer
    pub entry_id: EntryId,
    /// Charge composition
    pub breakdown: ChargeBreakdown,
    /// Session to create
    pub session: PaymentSessionRequest,
}

/// Pricing and link configuration for checkouts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSettings {
    /// Processor pricing
    pub fees: FeeSchedule,
    /// Platform's cut per ticket
    pub platform_fee_per_ticket: Money,
    /// ISO currency code, lowercase
    pub currency: String,
    /// Public site root for success/cancel links
    pub public_base_url: String,
}

/// Builds payment sessions from live offers.
#[derive(Clone, Debug)]
pub struct CheckoutOrchestrator {
    settings: CheckoutSettings,
    policy: SalesPolicy,
}

impl CheckoutOrchestrator {
    /// Creates an orchestrator
    #[must_use]
    pub fn new(settings: CheckoutSettings, policy: SalesPolicy) -> Self {
        Self { settings, policy }
    }

    /// Validates `request` against `ledger` at `now` and prices it.
    ///
    /// # Errors
    ///
    /// Returns the first [`CheckoutError`] precondition that fails.
    pub fn plan(
        &self,
        ledger: &EventLedger,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutPlan, CheckoutError> {
        let event = ledger.event().ok_or(CheckoutError::EventNotFound)?;
        if event.is_cancelled {
            return Err(CheckoutError::EventCancelled);
        }
        if event.sales_closed(now) {
            return Err(CheckoutError::SalesClosed);
        }

        let entry = ledger
            .entry_for_buyer(&request.buyer_id)
            .filter(|entry| entry.status == EntryStatus::Offered)
            .ok_or(CheckoutError::NoActiveOffer)?;
        if entry.offer_lapsed(now) {
            return Err(CheckoutError::OfferExpired);
        }

        let max = ledger.max_purchasable_quantity(now, self.policy.max_tickets_per_order);
        if request.quantity < 1 || request.quantity > max {
            return Err(CheckoutError::QuantityUnavailable {
                requested: request.quantity,
                max,
            });
        }

        let attendee_names = Self::validate_attendee_names(request)?;
        let connected_account = event
            .payout_account
            .clone()
            .ok_or(CheckoutError::PayoutAccountMissing)?;

        let base_subtotal = event
            .unit_price
            .checked_multiply(request.quantity)
            .ok_or(FeeError::Overflow)?;
        let platform_fee_total = self
            .settings
            .platform_fee_per_ticket
            .checked_multiply(request.quantity)
            .ok_or(FeeError::Overflow)?;
        let breakdown = fees::settle(base_subtotal, platform_fee_total, &self.settings.fees)?;

        let mut line_items = vec![LineItem {
            name: event.name.clone(),
            description: None,
            unit_amount: event.unit_price,
            quantity: request.quantity,
        }];
        if let Some(fee) = breakdown.fee_line_item() {
            line_items.push(LineItem {
                name: FEE_LINE_ITEM_NAME.to_string(),
                description: Some(FEE_LINE_ITEM_DESCRIPTION.to_string()),
                unit_amount: fee,
                quantity: 1,
            });
        }

        let metadata = CheckoutMetadata {
            event_id: event.id,
            buyer_id: request.buyer_id.clone(),
            entry_id: entry.id,
            quantity: Some(request.quantity),
            attendee_names,
            buyer: request.buyer.clone(),
        };

        let base_url = self.settings.public_base_url.trim_end_matches('/');
        let session = PaymentSessionRequest {
            currency: self.settings.currency.clone(),
            line_items,
            application_fee: breakdown.application_fee(),
            expires_at: now + self.policy.offer_ttl,
            metadata: metadata.encode(),
            success_url: format!(
                "{base_url}/tickets/purchase-success?session_id={{CHECKOUT_SESSION_ID}}&quantity={}&event_id={}",
                request.quantity, event.id
            ),
            cancel_url: format!("{base_url}/event/{}", event.id),
            connected_account,
        };

        Ok(CheckoutPlan {
            entry_id: entry.id,
            breakdown,
            session,
        })
    }

    fn validate_attendee_names(request: &CheckoutRequest) -> Result<Option<Vec<String>>, CheckoutError> {
        let names: Option<Vec<String>> = request
            .attendee_names
            .as_ref()
            .map(|names| names.iter().map(|name| name.trim().to_string()).collect());

        if request.quantity > 1 {
            let complete = names.as_ref().is_some_and(|names| {
                names.len() == request.quantity as usize && names.iter().all(|name| !name.is_empty())
            });
            if !complete {
                return Err(CheckoutError::MissingAttendeeNames {
                    quantity: request.quantity,
                });
            }
        }
        Ok(names.filter(|names| names.iter().any(|name| !name.is_empty())))
    }
}
