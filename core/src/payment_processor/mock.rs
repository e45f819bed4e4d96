//! In-memory payment processor for development and tests.

use super::{
    LineItemSummary, PaymentProcessor, PaymentSession, PaymentSessionRequest, ProcessorError,
    ProcessorFuture, SessionDetails, SessionStatus,
};
use crate::types::PaymentReference;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct MockSession {
    request: PaymentSessionRequest,
    status: SessionStatus,
    payment_reference: Option<PaymentReference>,
}

impl MockSession {
    fn details(&self, session_id: &str) -> SessionDetails {
        SessionDetails {
            session_id: session_id.to_string(),
            status: self.status,
            paid: self.payment_reference.is_some(),
            payment_reference: self.payment_reference.clone(),
            amount_total: Some(self.request.amount_total()),
            metadata: self.request.metadata.clone(),
        }
    }
}

/// Payment processor keeping sessions in memory.
///
/// Sessions stay open until [`MockPaymentProcessor::complete_session`] marks
/// them paid, standing in for the buyer finishing the hosted page.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentProcessor {
    sessions: Arc<Mutex<HashMap<String, MockSession>>>,
    order: Arc<Mutex<Vec<String>>>,
}

impl MockPaymentProcessor {
    /// Creates a new mock payment processor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a session paid, as if the buyer completed checkout.
    ///
    /// Returns the session as the processor would now report it, or `None`
    /// for an unknown session. Completing twice keeps the first charge.
    pub async fn complete_session(&self, session_id: &str) -> Option<SessionDetails> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(session_id)?;
        if session.payment_reference.is_none() {
            session.payment_reference = Some(PaymentReference::new(format!(
                "pi_mock_{}",
                Uuid::new_v4().simple()
            )));
            session.status = SessionStatus::Complete;
            tracing::info!(session_id, "Mock payment session completed");
        }
        Some(session.details(session_id))
    }

    /// Every session request received, oldest first
    pub async fn requests(&self) -> Vec<PaymentSessionRequest> {
        let sessions = self.sessions.lock().await;
        self.order
            .lock()
            .await
            .iter()
            .filter_map(|id| sessions.get(id).map(|session| session.request.clone()))
            .collect()
    }

    /// Most recently created session id
    pub async fn last_session_id(&self) -> Option<String> {
        self.order.lock().await.last().cloned()
    }
}

impl PaymentProcessor for MockPaymentProcessor {
    fn create_session(&self, request: PaymentSessionRequest) -> ProcessorFuture<'_, PaymentSession> {
        Box::pin(async move {
            let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
            let url = format!("https://checkout.mock.invalid/pay/{session_id}");

            tracing::info!(
                session_id = %session_id,
                amount_total = request.amount_total().cents(),
                "Mock payment session created"
            );

            self.sessions.lock().await.insert(
                session_id.clone(),
                MockSession {
                    request,
                    status: SessionStatus::Open,
                    payment_reference: None,
                },
            );
            self.order.lock().await.push(session_id.clone());
            Ok(PaymentSession { session_id, url })
        })
    }

    fn retrieve_session<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: &'a str,
    ) -> ProcessorFuture<'a, SessionDetails> {
        Box::pin(async move {
            let sessions = self.sessions.lock().await;
            sessions
                .get(session_id)
                .filter(|session| session.request.connected_account == connected_account)
                .map(|session| session.details(session_id))
                .ok_or_else(|| ProcessorError::SessionNotFound(session_id.to_string()))
        })
    }

    fn list_line_items<'a>(
        &'a self,
        session_id: &'a str,
        _connected_account: Option<&'a str>,
    ) -> ProcessorFuture<'a, Vec<LineItemSummary>> {
        Box::pin(async move {
            let sessions = self.sessions.lock().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| ProcessorError::SessionNotFound(session_id.to_string()))?;
            Ok(session
                .request
                .line_items
                .iter()
                .map(|item| LineItemSummary {
                    description: item.name.clone(),
                    quantity: item.quantity,
                })
                .collect())
        })
    }
}
