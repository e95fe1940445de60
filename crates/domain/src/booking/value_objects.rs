//! Slots and the collaborator-owned reference data a booking depends on.

use booking_store::ScheduleRecord;
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use common::{Money, ScheduleId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::{self, PricingInput};

/// A schedule slot as seen by the booking rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub schedule_id: ScheduleId,
    pub vehicle_id: i64,
    pub vehicle_type: String,
    pub brand: String,
    pub model: String,
    pub license_plate: String,
    pub hourly_rate: Money,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_reserved: bool,
}

impl ScheduleSlot {
    /// Length of the slot.
    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    /// Length of the slot in fractional hours.
    pub fn duration_hours(&self) -> Decimal {
        pricing::duration_hours(self.start_time, self.end_time)
    }

    /// Builds the pricing input for a driver with the given membership discount.
    pub fn pricing_input(&self, membership_discount_pct: Decimal) -> PricingInput {
        PricingInput {
            hourly_rate: self.hourly_rate,
            start_time: self.start_time,
            end_time: self.end_time,
            membership_discount_pct,
        }
    }
}

impl From<ScheduleRecord> for ScheduleSlot {
    fn from(r: ScheduleRecord) -> Self {
        Self {
            schedule_id: r.schedule_id,
            vehicle_id: r.vehicle_id,
            vehicle_type: r.vehicle_type,
            brand: r.brand,
            model: r.model,
            license_plate: r.license_plate,
            hourly_rate: r.hourly_rate,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
            is_reserved: r.is_reserved,
        }
    }
}

/// An unreserved slot offered to a driver, with its undiscounted cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotOffer {
    #[serde(flatten)]
    pub slot: ScheduleSlot,
    pub base_cost: Money,
}

impl From<ScheduleSlot> for SlotOffer {
    fn from(slot: ScheduleSlot) -> Self {
        let base_cost = slot.hourly_rate.scale(slot.duration_hours());
        Self { slot, base_cost }
    }
}

/// Driver data owned by the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub user_id: UserId,
    pub membership_id: String,
    pub license_expiry: NaiveDate,
}

impl DriverProfile {
    /// Returns true if the licence is still valid on `date`.
    pub fn license_valid_on(&self, date: NaiveDate) -> bool {
        self.license_expiry >= date
    }
}

/// Membership tier owned by the user service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub membership_id: String,
    pub hourly_rate_discount_pct: Decimal,
    /// Maximum number of Confirmed and Completed bookings per driver.
    pub booking_limit: u32,
}

/// Promotion owned by the promotion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub code: String,
    pub name: String,
    pub discount_pct: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
}

impl Promotion {
    /// Returns true if `date` falls inside the inclusive validity window.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.valid_from <= date && date <= self.valid_to
    }
}
