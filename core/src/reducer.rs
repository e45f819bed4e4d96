//! Reducer abstraction for ledger transitions.
//!
//! A reducer is a pure function `(EventLedger, Action, Environment) → events`:
//! it validates the action against the folded ledger, then emits the
//! [`LedgerEvent`]s that describe what happened, applying each one to the
//! ledger as it goes so later checks in the same transition see it.
//!
//! Reducers never touch storage. The [`crate::store::LedgerRepository`] loads
//! the ledger, runs the reducer and appends the emitted events atomically.

use crate::environment::Clock;
use crate::ledger::{EventLedger, LedgerEvent};
use chrono::{DateTime, Duration, Utc};
use smallvec::SmallVec;
use std::sync::Arc;

/// Events emitted by one reduction. Most transitions emit one or two.
pub type Emitted = SmallVec<[LedgerEvent; 4]>;

/// Result of a successful reduction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reduced<T> {
    /// Events to append, already applied to the ledger
    pub events: Emitted,
    /// Value returned to the caller
    pub output: T,
}

impl<T> Reduced<T> {
    /// Reduction that emitted nothing
    #[must_use]
    pub fn unchanged(output: T) -> Self {
        Self {
            events: SmallVec::new(),
            output,
        }
    }

    /// Reduction that emitted `events`
    #[must_use]
    pub const fn new(events: Emitted, output: T) -> Self {
        Self { events, output }
    }
}

/// Collects events while applying each to the ledger.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Emitted,
}

impl Recorder {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `event` to `ledger` and records it for appending
    pub fn record(&mut self, ledger: &mut EventLedger, event: LedgerEvent) {
        ledger.apply(&event);
        self.events.push(event);
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Finishes the reduction
    #[must_use]
    pub fn finish<T>(self, output: T) -> Reduced<T> {
        Reduced::new(self.events, output)
    }
}

/// Sales rules every reducer sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SalesPolicy {
    /// How long an offer holds capacity
    pub offer_ttl: Duration,
    /// Most tickets one order may contain
    pub max_tickets_per_order: u32,
}

impl Default for SalesPolicy {
    fn default() -> Self {
        Self {
            offer_ttl: Duration::minutes(30),
            max_tickets_per_order: 10,
        }
    }
}

/// Injected dependencies for ledger reducers.
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Source of `now`
    pub clock: Arc<dyn Clock>,
    /// Sales rules
    pub policy: SalesPolicy,
}

impl LedgerEnvironment {
    /// Creates an environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: SalesPolicy) -> Self {
        Self { clock, policy }
    }

    /// Current time
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for LedgerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEnvironment")
            .field("now", &self.clock.now())
            .field("policy", &self.policy)
            .finish()
    }
}

/// A transition over one event's ledger.
///
/// # Example
///
/// ```ignore
/// impl Reducer for CheckInReducer {
///     type Action = CheckInAction;
///     type Output = CheckInOutcome;
///     type Error = Infallible;
///
///     fn reduce(&self, ledger: &mut EventLedger, action: CheckInAction, env: &LedgerEnvironment)
///         -> Result<Reduced<CheckInOutcome>, Infallible>
///     {
///         // validate, then emit
///     }
/// }
/// ```
pub trait Reducer: Send + Sync {
    /// Input
    type Action: Clone + Send;

    /// Value returned on success
    type Output: Send;

    /// Business-rule rejection
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validates `action` against `ledger` and emits the resulting events.
    ///
    /// On `Ok`, every returned event has already been applied to `ledger`.
    /// On `Err`, the ledger may be partially updated and must be discarded.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` when the action violates a business rule.
    fn reduce(
        &self,
        ledger: &mut EventLedger,
        action: Self::Action,
        env: &LedgerEnvironment,
    ) -> Result<Reduced<Self::Output>, Self::Error>;
}
