//! Load → reduce → append with optimistic retry.

use super::{LedgerStore, StoreError, Version};
use crate::ledger::EventLedger;
use crate::reducer::{LedgerEnvironment, Reducer};
use crate::types::EventId;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of attempts before giving up on a contended event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Why a dispatched transition did not commit.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// Stream holds no event
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// Reducer refused the action
    #[error(transparent)]
    Rejected(E),

    /// Store failed
    #[error(transparent)]
    Store(StoreError),

    /// Every attempt lost a race with another writer
    #[error("gave up on event {event_id} after {attempts} conflicting attempts")]
    Contention {
        /// Contended event
        event_id: EventId,
        /// Attempts made
        attempts: u32,
    },
}

/// Runs reducers against stored ledgers.
///
/// Every transition reads the stream, folds it, runs the reducer and appends
/// the emitted events at the version it read. A concurrent append makes the
/// version check fail and the whole transition is re-run against fresh state,
/// so decisions are never made on a stale ledger.
#[derive(Clone)]
pub struct LedgerRepository {
    store: Arc<dyn LedgerStore>,
    env: LedgerEnvironment,
    max_attempts: u32,
}

impl LedgerRepository {
    /// Creates a repository
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, env: LedgerEnvironment) -> Self {
        Self {
            store,
            env,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the attempt budget (at least one)
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// The reducer environment
    #[must_use]
    pub const fn env(&self) -> &LedgerEnvironment {
        &self.env
    }

    /// Reads and folds a ledger. `None` if the event does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn load(&self, event_id: EventId) -> Result<Option<EventLedger>, StoreError> {
        let stream = self.store.load(event_id).await?;
        let ledger = EventLedger::replay(&stream.events);
        Ok(ledger.event().is_some().then_some(ledger))
    }

    /// Runs `reducer` against an existing event and commits its events.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::EventNotFound`] if the event does not exist
    /// - [`DispatchError::Rejected`] if the reducer refuses the action
    /// - [`DispatchError::Store`] if the store fails
    /// - [`DispatchError::Contention`] if every attempt conflicts
    pub async fn dispatch<R: Reducer>(
        &self,
        event_id: EventId,
        reducer: &R,
        action: R::Action,
    ) -> Result<R::Output, DispatchError<R::Error>> {
        self.run(event_id, reducer, action, true).await
    }

    /// Runs `reducer` against a stream that may be empty (event creation).
    ///
    /// # Errors
    ///
    /// Same as [`LedgerRepository::dispatch`], without `EventNotFound`.
    pub async fn dispatch_new<R: Reducer>(
        &self,
        event_id: EventId,
        reducer: &R,
        action: R::Action,
    ) -> Result<R::Output, DispatchError<R::Error>> {
        self.run(event_id, reducer, action, false).await
    }

    async fn run<R: Reducer>(
        &self,
        event_id: EventId,
        reducer: &R,
        action: R::Action,
        require_event: bool,
    ) -> Result<R::Output, DispatchError<R::Error>> {
        for attempt in 1..=self.max_attempts {
            let stream = self.store.load(event_id).await.map_err(DispatchError::Store)?;
            let expected: Version = stream.version;
            let mut ledger = EventLedger::replay(&stream.events);
            if require_event && ledger.event().is_none() {
                return Err(DispatchError::EventNotFound(event_id));
            }

            let reduced = reducer
                .reduce(&mut ledger, action.clone(), &self.env)
                .map_err(DispatchError::Rejected)?;
            if reduced.events.is_empty() {
                return Ok(reduced.output);
            }

            let types: Vec<&'static str> = reduced.events.iter().map(|e| e.event_type()).collect();
            match self
                .store
                .append(event_id, expected, reduced.events.into_vec())
                .await
            {
                Ok(version) => {
                    debug!(%event_id, %version, events = ?types, "Ledger events appended");
                    return Ok(reduced.output);
                }
                Err(StoreError::ConcurrencyConflict { actual, .. }) => {
                    crate::metrics::record_ledger_conflict();
                    debug!(%event_id, %expected, %actual, attempt, "Concurrent append, retrying");
                }
                Err(error) => return Err(DispatchError::Store(error)),
            }
        }

        warn!(%event_id, attempts = self.max_attempts, "Giving up on contended event");
        Err(DispatchError::Contention {
            event_id,
            attempts: self.max_attempts,
        })
    }
}

impl std::fmt::Debug for LedgerRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerRepository")
            .field("env", &self.env)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
