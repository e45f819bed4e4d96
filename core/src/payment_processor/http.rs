//! Stripe-compatible HTTP payment processor client.

use super::{
    LineItemSummary, Metadata, PaymentProcessor, PaymentSession, PaymentSessionRequest,
    ProcessorError, ProcessorFuture, ProcessorResult, SessionDetails, SessionStatus,
};
use crate::types::{Money, PaymentReference};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Header selecting the connected account a request acts on.
const CONNECTED_ACCOUNT_HEADER: &str = "Stripe-Account";

/// Processor client speaking the Stripe checkout-session API.
#[derive(Clone)]
pub struct HttpPaymentProcessor {
    client: Client,
    secret_key: String,
    api_url: String,
}

impl HttpPaymentProcessor {
    /// Create a new client with explicit secret key and API base URL
    #[must_use]
    pub fn new(secret_key: String, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorized(&self, builder: RequestBuilder, connected_account: Option<&str>) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.secret_key);
        match connected_account {
            Some(account) => builder.header(CONNECTED_ACCOUNT_HEADER, account),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        builder: RequestBuilder,
        session_id: Option<&str>,
    ) -> ProcessorResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| ProcessorError::RequestFailed(e.to_string()))?;
        Self::parse(response, session_id).await
    }

    async fn parse<T: DeserializeOwned>(
        response: Response,
        session_id: Option<&str>,
    ) -> ProcessorResult<T> {
        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| ProcessorError::ResponseParseFailed(e.to_string())),
            StatusCode::NOT_FOUND if session_id.is_some() => Err(ProcessorError::SessionNotFound(
                session_id.unwrap_or_default().to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => Err(ProcessorError::RateLimited),
            StatusCode::UNAUTHORIZED => Err(ProcessorError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProcessorError::Api {
                    status: status.as_u16(),
                    message: body,
                })
            }
        }
    }
}

impl std::fmt::Debug for HttpPaymentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentProcessor")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Flattens a session request into the processor's bracketed form encoding.
fn session_form(request: &PaymentSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        ("expires_at".to_string(), request.expires_at.timestamp().to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        (
            "payment_intent_data[application_fee_amount]".to_string(),
            request.application_fee.cents().to_string(),
        ),
    ];

    for (index, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{index}]");
        form.push((format!("{prefix}[price_data][currency]"), request.currency.clone()));
        form.push((format!("{prefix}[price_data][product_data][name]"), item.name.clone()));
        if let Some(description) = item.description.as_ref().filter(|d| !d.is_empty()) {
            form.push((
                format!("{prefix}[price_data][product_data][description]"),
                description.clone(),
            ));
        }
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.cents().to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value.clone()));
    }
    form
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    id: String,
    url: Option<String>,
}

/// `payment_intent` is an id, or the full object when expanded.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PaymentIntentField {
    Id(String),
    Object { id: String },
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    status: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<PaymentIntentField>,
    amount_total: Option<u64>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl From<SessionObject> for SessionDetails {
    fn from(session: SessionObject) -> Self {
        let status = match session.status.as_deref() {
            Some("complete") => SessionStatus::Complete,
            Some("expired") => SessionStatus::Expired,
            _ => SessionStatus::Open,
        };
        let payment_reference = session.payment_intent.map(|intent| match intent {
            PaymentIntentField::Id(id) | PaymentIntentField::Object { id } => {
                PaymentReference::new(id)
            }
        });
        Self {
            session_id: session.id,
            status,
            paid: session.payment_status.as_deref() == Some("paid"),
            payment_reference,
            amount_total: session.amount_total.map(Money::from_cents),
            metadata: session.metadata.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LineItemObject {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LineItemList {
    data: Vec<LineItemObject>,
}

impl PaymentProcessor for HttpPaymentProcessor {
    fn create_session(&self, request: PaymentSessionRequest) -> ProcessorFuture<'_, PaymentSession> {
        Box::pin(async move {
            let builder = self.authorized(
                self.client
                    .post(format!("{}/checkout/sessions", self.api_url))
                    .form(&session_form(&request)),
                Some(&request.connected_account),
            );
            let created: SessionCreated = Self::send(builder, None).await?;

            tracing::info!(
                session_id = %created.id,
                amount_total = request.amount_total().cents(),
                application_fee = request.application_fee.cents(),
                "Payment session created"
            );

            Ok(PaymentSession {
                url: created.url.unwrap_or_default(),
                session_id: created.id,
            })
        })
    }

    fn retrieve_session<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: &'a str,
    ) -> ProcessorFuture<'a, SessionDetails> {
        Box::pin(async move {
            let builder = self.authorized(
                self.client
                    .get(format!("{}/checkout/sessions/{session_id}", self.api_url))
                    .query(&[("expand[]", "payment_intent")]),
                Some(connected_account),
            );
            let session: SessionObject = Self::send(builder, Some(session_id)).await?;
            Ok(session.into())
        })
    }

    fn list_line_items<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: Option<&'a str>,
    ) -> ProcessorFuture<'a, Vec<LineItemSummary>> {
        Box::pin(async move {
            let builder = self.authorized(
                self.client
                    .get(format!("{}/checkout/sessions/{session_id}/line_items", self.api_url))
                    .query(&[("limit", "100")]),
                connected_account,
            );
            let list: LineItemList = Self::send(builder, Some(session_id)).await?;
            Ok(list
                .data
                .into_iter()
                .map(|item| LineItemSummary {
                    description: item.description.unwrap_or_default(),
                    quantity: item.quantity.unwrap_or(0),
                })
                .collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::payment_processor::LineItem;
    use chrono::{TimeZone, Utc};

    fn request() -> PaymentSessionRequest {
        PaymentSessionRequest {
            currency: "cad".to_string(),
            line_items: vec![
                LineItem {
                    name: "Show".to_string(),
                    description: None,
                    unit_amount: Money::from_cents(10_000),
                    quantity: 1,
                },
                LineItem {
                    name: "Service fees".to_string(),
                    description: Some("Service and processing fees".to_string()),
                    unit_amount: Money::from_cents(433),
                    quantity: 1,
                },
            ],
            application_fee: Money::from_cents(100),
            expires_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap(),
            metadata: Metadata::from([("event_id".to_string(), "evt".to_string())]),
            success_url: "https://example.com/ok".to_string(),
            cancel_url: "https://example.com/no".to_string(),
            connected_account: "acct_1".to_string(),
        }
    }

    #[test]
    fn test_session_form_uses_bracketed_keys() {
        let form = session_form(&request());
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("line_items[1][price_data][unit_amount]"), Some("433"));
        assert_eq!(get("payment_intent_data[application_fee_amount]"), Some("100"));
        assert_eq!(get("metadata[event_id]"), Some("evt"));
        assert_eq!(get("payment_intent_data[metadata][event_id]"), Some("evt"));
        assert_eq!(get("expires_at"), Some("1735691400"));
        assert_eq!(get("line_items[0][price_data][product_data][description]"), None);
    }

    #[test]
    fn test_session_object_accepts_expanded_payment_intent() {
        let json = r#"{
            "id": "cs_1",
            "status": "complete",
            "payment_status": "paid",
            "payment_intent": { "id": "pi_1", "object": "payment_intent" },
            "amount_total": 10433,
            "metadata": { "quantity": "1" }
        }"#;
        let details: SessionDetails = serde_json::from_str::<SessionObject>(json).unwrap().into();

        assert!(details.paid);
        assert_eq!(details.status, SessionStatus::Complete);
        assert_eq!(details.payment_reference, Some(PaymentReference::new("pi_1")));
        assert_eq!(details.amount_total, Some(Money::from_cents(10_433)));
    }
}
