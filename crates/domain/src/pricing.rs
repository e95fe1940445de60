//! Pricing engine.
//!
//! Computes the cost of a slot from its hourly rate and duration, then
//! applies the membership discount and, optionally, a promotion on top of the
//! membership-discounted amount:
//!
//! ```text
//! base        = rate * hours
//! membership  = base * membership_pct / 100
//! promotion   = (base - membership) * promo_pct / 100
//! total       = base - membership - promotion
//! ```
//!
//! The engine is pure: the caller looks the promotion up and supplies the
//! date it is evaluated against.

use chrono::{NaiveDate, NaiveTime};
use common::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::booking::Promotion;

const SECONDS_PER_HOUR: i64 = 3600;

/// Errors raised while pricing a slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// No promotion exists for the code.
    #[error("Promotion code {code} not found")]
    PromoNotFound { code: String },

    /// The promotion is not valid on the evaluation date.
    #[error("Promotion code {code} is only valid from {valid_from} to {valid_to}")]
    PromoExpired {
        code: String,
        valid_from: NaiveDate,
        valid_to: NaiveDate,
    },

    /// The slot ends before it starts.
    #[error("Invalid time range: {start} to {end}")]
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },

    /// A discount percentage is outside 0..=100.
    #[error("Invalid discount percentage: {pct}")]
    InvalidDiscount { pct: Decimal },

    /// The hourly rate is negative.
    #[error("Invalid hourly rate: {rate}")]
    InvalidRate { rate: Money },
}

/// What the engine needs to know about a slot and the driver's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingInput {
    pub hourly_rate: Money,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub membership_discount_pct: Decimal,
}

/// The priced breakdown of a booking.
///
/// `total_amount == base_cost - total_discount` and
/// `total_discount == membership_discount + promotion_discount` always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub base_cost: Money,
    pub membership_discount: Money,
    pub promotion_discount: Money,
    pub total_discount: Money,
    pub total_amount: Money,
    pub promo_code: Option<String>,
}

/// Returns the duration between two times of day in fractional hours.
pub fn duration_hours(start: NaiveTime, end: NaiveTime) -> Decimal {
    Decimal::from((end - start).num_seconds()) / Decimal::from(SECONDS_PER_HOUR)
}

fn check_pct(pct: Decimal) -> Result<(), PricingError> {
    if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
        return Err(PricingError::InvalidDiscount { pct });
    }
    Ok(())
}

/// Prices a slot, optionally applying `promotion` as evaluated on `today`.
pub fn compute_amount(
    input: &PricingInput,
    promotion: Option<&Promotion>,
    today: NaiveDate,
) -> Result<Quote, PricingError> {
    if input.hourly_rate.is_negative() {
        return Err(PricingError::InvalidRate {
            rate: input.hourly_rate,
        });
    }
    if input.end_time < input.start_time {
        return Err(PricingError::InvalidTimeRange {
            start: input.start_time,
            end: input.end_time,
        });
    }
    check_pct(input.membership_discount_pct)?;

    let hours = duration_hours(input.start_time, input.end_time);
    let base_cost = input.hourly_rate.scale(hours);
    let membership_discount = base_cost.percent(input.membership_discount_pct);
    let after_membership = base_cost - membership_discount;

    let (promotion_discount, promo_code) = match promotion {
        None => (Money::zero(), None),
        Some(promo) => {
            if !promo.is_valid_on(today) {
                return Err(PricingError::PromoExpired {
                    code: promo.code.clone(),
                    valid_from: promo.valid_from,
                    valid_to: promo.valid_to,
                });
            }
            check_pct(promo.discount_pct)?;
            (
                after_membership.percent(promo.discount_pct),
                Some(promo.code.clone()),
            )
        }
    };

    Ok(Quote {
        base_cost,
        membership_discount,
        promotion_discount,
        total_discount: membership_discount + promotion_discount,
        total_amount: after_membership - promotion_discount,
        promo_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn time(t: &str) -> NaiveTime {
        NaiveTime::parse_from_str(t, "%H:%M").unwrap()
    }

    fn date(d: &str) -> NaiveDate {
        d.parse().unwrap()
    }

    fn input(rate: &str, start: &str, end: &str, pct: i64) -> PricingInput {
        PricingInput {
            hourly_rate: money(rate),
            start_time: time(start),
            end_time: time(end),
            membership_discount_pct: Decimal::from(pct),
        }
    }

    fn promo(pct: i64, from: &str, to: &str) -> Promotion {
        Promotion {
            code: "SPRING5".to_string(),
            name: "Spring sale".to_string(),
            discount_pct: Decimal::from(pct),
            valid_from: date(from),
            valid_to: date(to),
        }
    }

    #[test]
    fn test_membership_discount_only() {
        let quote = compute_amount(&input("10", "09:00", "11:00", 10), None, date("2030-01-01"))
            .unwrap();

        assert_eq!(quote.base_cost, money("20"));
        assert_eq!(quote.membership_discount, money("2"));
        assert_eq!(quote.promotion_discount, Money::zero());
        assert_eq!(quote.total_discount, money("2"));
        assert_eq!(quote.total_amount, money("18"));
        assert_eq!(quote.promo_code, None);
    }

    #[test]
    fn test_promotion_compounds_on_membership_price() {
        let p = promo(5, "2030-01-01", "2030-01-31");
        let quote = compute_amount(
            &input("10", "09:00", "11:00", 10),
            Some(&p),
            date("2030-01-15"),
        )
        .unwrap();

        assert_eq!(quote.promotion_discount, money("0.9"));
        assert_eq!(quote.total_discount, money("2.9"));
        assert_eq!(quote.total_amount, money("17.1"));
        assert_eq!(quote.promo_code.as_deref(), Some("SPRING5"));
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let p = promo(5, "2030-01-01", "2030-01-31");
        let i = input("10", "09:00", "11:00", 0);

        assert!(compute_amount(&i, Some(&p), date("2030-01-01")).is_ok());
        assert!(compute_amount(&i, Some(&p), date("2030-01-31")).is_ok());
        assert!(matches!(
            compute_amount(&i, Some(&p), date("2030-02-01")),
            Err(PricingError::PromoExpired { .. })
        ));
        assert!(matches!(
            compute_amount(&i, Some(&p), date("2029-12-31")),
            Err(PricingError::PromoExpired { .. })
        ));
    }

    #[test]
    fn test_fractional_hours() {
        let quote = compute_amount(&input("12", "10:00", "11:30", 0), None, date("2030-01-01"))
            .unwrap();
        assert_eq!(quote.base_cost, money("18"));
        assert_eq!(quote.total_amount, money("18"));
    }

    #[test]
    fn test_zero_duration_prices_to_zero() {
        let quote = compute_amount(&input("10", "09:00", "09:00", 10), None, date("2030-01-01"))
            .unwrap();
        assert!(quote.base_cost.is_zero());
        assert!(quote.total_amount.is_zero());
    }

    #[test]
    fn test_total_matches_closed_form() {
        // total = r * d * (1 - m/100) * (1 - p/100)
        let cases = [("8", "08:00", "12:00", 20, 25), ("15", "13:00", "14:30", 5, 10)];
        for (rate, start, end, m, p) in cases {
            let promotion = promo(p, "2030-01-01", "2030-12-31");
            let quote = compute_amount(
                &input(rate, start, end, m),
                Some(&promotion),
                date("2030-06-01"),
            )
            .unwrap();

            let hours = duration_hours(time(start), time(end));
            let hundred = Decimal::ONE_HUNDRED;
            let expected = money(rate).amount()
                * hours
                * (hundred - Decimal::from(m))
                / hundred
                * (hundred - Decimal::from(p))
                / hundred;
            assert_eq!(quote.total_amount.amount(), expected);
            assert_eq!(quote.base_cost - quote.total_discount, quote.total_amount);
        }
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let today = date("2030-01-01");
        assert!(matches!(
            compute_amount(&input("10", "11:00", "09:00", 0), None, today),
            Err(PricingError::InvalidTimeRange { .. })
        ));
        assert!(matches!(
            compute_amount(&input("-1", "09:00", "11:00", 0), None, today),
            Err(PricingError::InvalidRate { .. })
        ));
        assert!(matches!(
            compute_amount(&input("10", "09:00", "11:00", 101), None, today),
            Err(PricingError::InvalidDiscount { .. })
        ));

        let bad_promo = promo(-5, "2030-01-01", "2030-01-31");
        assert!(matches!(
            compute_amount(&input("10", "09:00", "11:00", 0), Some(&bad_promo), today),
            Err(PricingError::InvalidDiscount { .. })
        ));
    }
}
