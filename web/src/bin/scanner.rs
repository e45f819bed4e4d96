//! Door scanner client.
//!
//! Reads decoded ticket codes one per line from stdin (a barcode reader in
//! keyboard mode, or a camera decoder piped in), drops repeats within the
//! cooldown, and posts each scan to the server's check-in endpoint.
//!
//! # Usage
//!
//! ```bash
//! SCANNER_EVENT_ID=<event uuid> SCANNER_SELLER_ID=seller_1 cargo run --bin scanner
//! # or
//! cargo run --bin scanner -- <event uuid> seller_1
//! ```

use boxoffice_core::CheckInOutcome;
use boxoffice_core::Config;
use boxoffice_core::scan::ScanDebouncer;
use boxoffice_web::USER_ID_HEADER;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let mut args = std::env::args().skip(1);
    let event_id = args
        .next()
        .or_else(|| std::env::var("SCANNER_EVENT_ID").ok())
        .ok_or_else(|| anyhow::anyhow!("event id required (argument or SCANNER_EVENT_ID)"))?;
    let event_id = Uuid::parse_str(&event_id)?;
    let seller_id = args
        .next()
        .or_else(|| std::env::var("SCANNER_SELLER_ID").ok())
        .ok_or_else(|| anyhow::anyhow!("seller id required (argument or SCANNER_SELLER_ID)"))?;

    let endpoint = format!(
        "{}/api/events/{event_id}/check-in",
        config.scanner.server_url.trim_end_matches('/')
    );
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let mut debouncer = ScanDebouncer::new(Duration::from_millis(config.scanner.cooldown_ms));

    tracing::info!(%endpoint, "Scanner ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let code = line.trim();
        if code.is_empty() || !debouncer.admit(code, Instant::now()) {
            continue;
        }
        let Ok(ticket_id) = Uuid::parse_str(code) else {
            println!("INVALID  unreadable code");
            continue;
        };

        match submit(&client, &endpoint, &seller_id, ticket_id).await {
            Ok(outcome) => println!("{}", describe(&outcome)),
            Err(error) => {
                tracing::warn!(%error, %ticket_id, "Check-in request failed");
                println!("ERROR    {error}");
            }
        }
    }

    Ok(())
}

async fn submit(
    client: &reqwest::Client,
    endpoint: &str,
    seller_id: &str,
    ticket_id: Uuid,
) -> anyhow::Result<CheckInOutcome> {
    let response = client
        .post(endpoint)
        .header(USER_ID_HEADER, seller_id)
        .json(&serde_json::json!({ "ticket_id": ticket_id }))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

fn describe(outcome: &CheckInOutcome) -> String {
    match outcome {
        CheckInOutcome::CheckedIn { attendee } => {
            let name = attendee
                .attendee_name
                .as_deref()
                .or(attendee.buyer_name.as_deref())
                .unwrap_or("guest");
            format!("ADMIT    {name}")
        }
        CheckInOutcome::AlreadyCheckedIn => "DENIED   already checked in".to_string(),
        CheckInOutcome::WrongEvent => "DENIED   ticket is for another event".to_string(),
        CheckInOutcome::EventCancelled => "DENIED   event cancelled".to_string(),
        CheckInOutcome::Invalid => "DENIED   unknown ticket".to_string(),
    }
}
