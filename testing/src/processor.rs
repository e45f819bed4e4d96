//! Payment processor double with call recording and failure injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a failed test

use boxoffice_core::payment_processor::{
    LineItemSummary, MockPaymentProcessor, PaymentProcessor, PaymentSession,
    PaymentSessionRequest, ProcessorError, ProcessorFuture, SessionDetails,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One call made to the processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorCall {
    /// `create_session`
    CreateSession(PaymentSessionRequest),
    /// `retrieve_session`
    RetrieveSession {
        /// Session
        session_id: String,
        /// Connected account
        connected_account: String,
    },
    /// `list_line_items`
    ListLineItems {
        /// Session
        session_id: String,
    },
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<ProcessorCall>,
    create_failures: VecDeque<ProcessorError>,
    retrieve_failures: VecDeque<ProcessorError>,
    line_item_failures: VecDeque<ProcessorError>,
}

/// [`MockPaymentProcessor`] that records every call and fails on demand.
///
/// Queued failures are returned by the next matching calls, oldest first;
/// once the queue is empty calls reach the mock again.
#[derive(Clone, Debug, Default)]
pub struct RecordingPaymentProcessor {
    inner: MockPaymentProcessor,
    recording: Arc<Mutex<Recording>>,
}

impl RecordingPaymentProcessor {
    /// Create a new recording processor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a session paid, as if the buyer completed checkout
    pub async fn complete_session(&self, session_id: &str) -> Option<SessionDetails> {
        self.inner.complete_session(session_id).await
    }

    /// Every call so far, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.recording.lock().unwrap().calls.clone()
    }

    /// Session requests received, oldest first
    #[must_use]
    pub fn session_requests(&self) -> Vec<PaymentSessionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProcessorCall::CreateSession(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Fail the next `create_session`
    pub fn fail_next_create(&self, error: ProcessorError) {
        self.recording.lock().unwrap().create_failures.push_back(error);
    }

    /// Fail the next `retrieve_session`
    pub fn fail_next_retrieve(&self, error: ProcessorError) {
        self.recording.lock().unwrap().retrieve_failures.push_back(error);
    }

    /// Fail the next `list_line_items`
    pub fn fail_next_line_items(&self, error: ProcessorError) {
        self.recording.lock().unwrap().line_item_failures.push_back(error);
    }

    fn record(&self, call: ProcessorCall) -> Option<ProcessorError> {
        let mut recording = self.recording.lock().unwrap();
        let failure = match &call {
            ProcessorCall::CreateSession(_) => recording.create_failures.pop_front(),
            ProcessorCall::RetrieveSession { .. } => recording.retrieve_failures.pop_front(),
            ProcessorCall::ListLineItems { .. } => recording.line_item_failures.pop_front(),
        };
        recording.calls.push(call);
        failure
    }
}

impl PaymentProcessor for RecordingPaymentProcessor {
    fn create_session(&self, request: PaymentSessionRequest) -> ProcessorFuture<'_, PaymentSession> {
        let failure = self.record(ProcessorCall::CreateSession(request.clone()));
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => self.inner.create_session(request).await,
            }
        })
    }

    fn retrieve_session<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: &'a str,
    ) -> ProcessorFuture<'a, SessionDetails> {
        let failure = self.record(ProcessorCall::RetrieveSession {
            session_id: session_id.to_string(),
            connected_account: connected_account.to_string(),
        });
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => self.inner.retrieve_session(session_id, connected_account).await,
            }
        })
    }

    fn list_line_items<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: Option<&'a str>,
    ) -> ProcessorFuture<'a, Vec<LineItemSummary>> {
        let failure = self.record(ProcessorCall::ListLineItems {
            session_id: session_id.to_string(),
        });
        Box::pin(async move {
            match failure {
                Some(error) => Err(error),
                None => self.inner.list_line_items(session_id, connected_account).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_failure_is_returned_once() {
        let processor = RecordingPaymentProcessor::new();
        processor.fail_next_retrieve(ProcessorError::RateLimited);

        let first = processor.retrieve_session("cs_1", "acct").await;
        let second = processor.retrieve_session("cs_1", "acct").await;

        assert_eq!(first, Err(ProcessorError::RateLimited));
        assert!(matches!(second, Err(ProcessorError::SessionNotFound(_))));
        assert_eq!(processor.calls().len(), 2);
    }
}
