//! Row types exchanged with the store.
//!
//! Booking status is persisted as text; interpreting it belongs to the
//! domain layer, which rejects values it does not recognize.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{BookingId, Money, ScheduleId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable schedule slot joined with the vehicle it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
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

/// A persisted booking row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub booking_id: BookingId,
    pub schedule_id: ScheduleId,
    pub user_id: UserId,
    pub status: String,
    pub base_cost: Money,
    pub promo_code: Option<String>,
    pub membership_discount: Money,
    pub promotion_discount: Money,
    pub discount_applied: Money,
    pub total_amount: Money,
    pub confirmation_key: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A booking to insert; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub schedule_id: ScheduleId,
    pub user_id: UserId,
    pub status: String,
    pub base_cost: Money,
    pub promo_code: Option<String>,
    pub membership_discount: Money,
    pub promotion_discount: Money,
    pub discount_applied: Money,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl NewBooking {
    /// Materializes the row once the store has assigned its identifier.
    pub(crate) fn into_record(self, booking_id: BookingId) -> BookingRecord {
        BookingRecord {
            booking_id,
            schedule_id: self.schedule_id,
            user_id: self.user_id,
            status: self.status,
            base_cost: self.base_cost,
            promo_code: self.promo_code,
            membership_discount: self.membership_discount,
            promotion_discount: self.promotion_discount,
            discount_applied: self.discount_applied,
            total_amount: self.total_amount,
            confirmation_key: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// A booking together with the slot it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedSlot {
    pub booking: BookingRecord,
    pub schedule: ScheduleRecord,
}

/// A vehicle to register in the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVehicle {
    pub vehicle_type: String,
    pub brand: String,
    pub model: String,
    pub license_plate: String,
    pub hourly_rate: Money,
}

/// A time slot to open for an existing vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub vehicle_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}
