//! Fee settlement engine.
//!
//! Converts a seller's desired net subtotal into the buyer-facing total that
//! still leaves the seller whole after the platform fee and the processor fee
//! are taken out. The processor fee depends on the total itself, so the total
//! is found by a bounded fixed-point search around an analytic seed.
//!
//! All amounts are integer cents. The processor rate is carried in basis
//! points so `round(total * rate)` is exact half-up integer arithmetic.

use crate::error::ErrorKind;
use crate::types::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis points in one whole (100%).
const BPS_DENOMINATOR: u64 = 10_000;

/// Upper bound on steps taken by either search loop.
pub const MAX_SEARCH_STEPS: u32 = 10;

/// Processor pricing: a percentage of the total plus a flat amount per charge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Percentage fee in basis points (290 = 2.9%)
    pub rate_bps: u32,
    /// Flat fee in cents per charge
    pub flat_cents: u64,
}

impl FeeSchedule {
    /// Creates a fee schedule
    #[must_use]
    pub const fn new(rate_bps: u32, flat_cents: u64) -> Self {
        Self {
            rate_bps,
            flat_cents,
        }
    }
}

impl Default for FeeSchedule {
    /// 2.9% + 30¢
    fn default() -> Self {
        Self::new(290, 30)
    }
}

/// Fee engine failures.
///
/// Every variant is an internal invariant violation: the charge must not be
/// built from a total the engine could not prove correct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    /// Rate of 100% or more leaves nothing to solve for
    #[error("processor rate of {rate_bps} bps is not below 100%")]
    InvalidRate {
        /// Offending rate
        rate_bps: u32,
    },

    /// Amounts too large for cent arithmetic
    #[error("fee arithmetic overflowed")]
    Overflow,

    /// The seed was further from the fixed point than the step bound allows
    #[error("fee search did not converge within {MAX_SEARCH_STEPS} steps (seed {seed})")]
    SearchDidNotConverge {
        /// Analytic seed the search started from
        seed: u64,
    },
}

impl FeeError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Derived charge composition for one checkout. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    /// Unit price × quantity
    pub base_subtotal: Money,
    /// Platform's cut across all tickets
    pub platform_fee_total: Money,
    /// Processor fee charged on `total`
    pub processor_fee: Money,
    /// Buyer-facing total
    pub total: Money,
}

impl ChargeBreakdown {
    /// The fee line item shown to the buyer: `total - base_subtotal`, only when positive
    #[must_use]
    pub const fn fee_line_item(&self) -> Option<Money> {
        match self.total.cents().checked_sub(self.base_subtotal.cents()) {
            Some(fee) if fee > 0 => Some(Money::from_cents(fee)),
            _ => None,
        }
    }

    /// Amount forwarded to the platform through the split payment
    #[must_use]
    pub const fn application_fee(&self) -> Money {
        self.platform_fee_total
    }

    /// What the seller receives after both fees
    #[must_use]
    pub const fn seller_net(&self) -> Money {
        Money::from_cents(
            self.total
                .cents()
                .saturating_sub(self.platform_fee_total.cents())
                .saturating_sub(self.processor_fee.cents()),
        )
    }
}

/// Processor fee charged on `total`: `round(total * rate) + flat`, rounding half up.
///
/// # Errors
///
/// Returns [`FeeError::Overflow`] if the intermediate product does not fit.
pub fn processor_fee(total: u64, schedule: &FeeSchedule) -> Result<u64, FeeError> {
    let scaled = total
        .checked_mul(u64::from(schedule.rate_bps))
        .and_then(|product| product.checked_add(BPS_DENOMINATOR / 2))
        .ok_or(FeeError::Overflow)?;
    (scaled / BPS_DENOMINATOR)
        .checked_add(schedule.flat_cents)
        .ok_or(FeeError::Overflow)
}

/// Whether charging `total` leaves the seller at least `base_subtotal`.
fn covers(
    total: u64,
    base_subtotal: u64,
    platform_fee_total: u64,
    schedule: &FeeSchedule,
) -> Result<bool, FeeError> {
    let deductions = processor_fee(total, schedule)?
        .checked_add(platform_fee_total)
        .ok_or(FeeError::Overflow)?;
    Ok(total
        .checked_sub(deductions)
        .is_some_and(|net| net >= base_subtotal))
}

/// `ceil((base + platform + flat) / (1 - rate))`
fn seed(base_subtotal: u64, platform_fee_total: u64, schedule: &FeeSchedule) -> Result<u64, FeeError> {
    let keep_bps = BPS_DENOMINATOR - u64::from(schedule.rate_bps);
    let needed = base_subtotal
        .checked_add(platform_fee_total)
        .and_then(|sum| sum.checked_add(schedule.flat_cents))
        .and_then(|sum| sum.checked_mul(BPS_DENOMINATOR))
        .ok_or(FeeError::Overflow)?;
    Ok(needed.div_ceil(keep_bps))
}

/// Computes the minimal buyer-facing total that nets the seller `base_subtotal`.
///
/// # Errors
///
/// - [`FeeError::InvalidRate`] if the rate is 100% or more
/// - [`FeeError::Overflow`] if the amounts do not fit in cent arithmetic
/// - [`FeeError::SearchDidNotConverge`] if either search loop exceeds
///   [`MAX_SEARCH_STEPS`]
pub fn settle(
    base_subtotal: Money,
    platform_fee_total: Money,
    schedule: &FeeSchedule,
) -> Result<ChargeBreakdown, FeeError> {
    if u64::from(schedule.rate_bps) >= BPS_DENOMINATOR {
        return Err(FeeError::InvalidRate {
            rate_bps: schedule.rate_bps,
        });
    }

    let base = base_subtotal.cents();
    let platform = platform_fee_total.cents();
    let start = seed(base, platform, schedule)?;
    let mut total = start;

    // Rounding can leave the seed just short.
    let mut steps = 0;
    while !covers(total, base, platform, schedule)? {
        steps += 1;
        if steps > MAX_SEARCH_STEPS {
            return Err(FeeError::SearchDidNotConverge { seed: start });
        }
        total = total.checked_add(1).ok_or(FeeError::Overflow)?;
    }

    // Walk back any overshoot to the true minimum.
    let mut steps = 0;
    while total > 0 && covers(total - 1, base, platform, schedule)? {
        steps += 1;
        if steps > MAX_SEARCH_STEPS {
            return Err(FeeError::SearchDidNotConverge { seed: start });
        }
        total -= 1;
    }

    Ok(ChargeBreakdown {
        base_subtotal,
        platform_fee_total,
        processor_fee: Money::from_cents(processor_fee(total, schedule)?),
        total: Money::from_cents(total),
    })
}
