//! Configuration management for the box office.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::checkout::CheckoutSettings;
use crate::fees::FeeSchedule;
use crate::reducer::SalesPolicy;
use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Sales rules and checkout links
    pub sales: SalesConfig,
    /// Payment processor pricing
    pub fees: FeeConfig,
    /// Payment processor connection
    pub processor: ProcessorConfig,
    /// Check-in scanner client
    pub scanner: ScannerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// Seconds between eager offer-expiry sweeps (0 disables the sweep)
    pub sweep_interval: u64,
}

/// Sales configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesConfig {
    /// Seconds an offer holds capacity; also the payment session lifetime
    pub offer_ttl_secs: i64,
    /// Most tickets in one order
    pub max_tickets_per_order: u32,
    /// ISO currency code, lowercase
    pub currency: String,
    /// Platform fee per ticket, in cents
    pub platform_fee_cents: u64,
    /// Public site root for success and cancel links
    pub public_base_url: String,
}

/// Processor pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Percentage fee in basis points
    pub rate_bps: u32,
    /// Flat fee per charge, in cents
    pub flat_cents: u64,
}

/// Processor connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// API base URL
    pub api_url: String,
    /// Secret key; `None` selects the in-memory mock processor
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
}

/// Scanner client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Box office server the scanner posts to
    pub server_url: String,
    /// Milliseconds during which a repeated scan is dropped
    pub cooldown_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let parsed = |key: &'static str| Parsed { lookup, key };

        Self {
            server: ServerConfig {
                host: string("HOST", "0.0.0.0"),
                port: parsed("PORT").or(8080),
                metrics_host: string("METRICS_HOST", "0.0.0.0"),
                metrics_port: parsed("METRICS_PORT").or(9090),
                shutdown_timeout: parsed("SHUTDOWN_TIMEOUT").or(30),
                sweep_interval: parsed("OFFER_SWEEP_INTERVAL").or(60),
            },
            sales: SalesConfig {
                offer_ttl_secs: positive(parsed("OFFER_TTL_SECS").get(), 1800),
                max_tickets_per_order: positive(parsed("MAX_TICKETS_PER_ORDER").get(), 10),
                currency: string("CURRENCY", "cad").to_lowercase(),
                platform_fee_cents: parsed("PLATFORM_FEE_CENTS").or(100),
                public_base_url: string("PUBLIC_BASE_URL", "http://localhost:3000"),
            },
            fees: FeeConfig {
                rate_bps: parsed("PROCESSOR_FEE_RATE_BPS")
                    .get()
                    .filter(|bps| *bps < 10_000)
                    .unwrap_or(290),
                flat_cents: parsed("PROCESSOR_FEE_FLAT_CENTS").or(30),
            },
            processor: ProcessorConfig {
                api_url: string("PAYMENT_API_URL", "https://api.stripe.com/v1"),
                secret_key: lookup("PAYMENT_SECRET_KEY").filter(|key| !key.trim().is_empty()),
            },
            scanner: ScannerConfig {
                server_url: string("BOXOFFICE_URL", "http://localhost:8080"),
                cooldown_ms: parsed("SCAN_COOLDOWN_MS").or(1500),
            },
        }
    }

    /// Sales rules for the reducers
    #[must_use]
    pub fn sales_policy(&self) -> SalesPolicy {
        SalesPolicy {
            offer_ttl: chrono::Duration::seconds(self.sales.offer_ttl_secs),
            max_tickets_per_order: self.sales.max_tickets_per_order,
        }
    }

    /// Processor pricing for the fee engine
    #[must_use]
    pub const fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.fees.rate_bps, self.fees.flat_cents)
    }

    /// Pricing and links for checkout sessions
    #[must_use]
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            fees: self.fee_schedule(),
            platform_fee_per_ticket: Money::from_cents(self.sales.platform_fee_cents),
            currency: self.sales.currency.clone(),
            public_base_url: self.sales.public_base_url.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// One variable, parsed on demand into whatever type the field needs.
struct Parsed<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    key: &'static str,
}

impl Parsed<'_> {
    fn get<T: FromStr>(&self) -> Option<T> {
        (self.lookup)(self.key).and_then(|value| value.trim().parse().ok())
    }

    fn or<T: FromStr>(&self, default: T) -> T {
        self.get().unwrap_or(default)
    }
}

fn positive<T: PartialOrd + Default>(value: Option<T>, default: T) -> T {
    value.filter(|value| *value > T::default()).unwrap_or(default)
}
