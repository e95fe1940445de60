//! Booking aggregate and related types.

mod aggregate;
mod events;
mod policy;
mod service;
mod state;
mod value_objects;

pub use aggregate::{Booking, BookingDetails};
pub use events::BookingEvent;
pub use policy::{DEFAULT_MINIMUM_LEAD_HOURS, DEFAULT_TIMEZONE, LeadTimePolicy};
pub use service::BookingService;
pub use state::{BookingStatus, UnknownStatus};
pub use value_objects::{DriverProfile, Membership, Promotion, ScheduleSlot, SlotOffer};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use common::{BookingId, Money, ScheduleId};
use thiserror::Error;

/// Errors that can occur during booking operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// The schedule slot does not exist.
    #[error("Schedule {0} not found")]
    ScheduleNotFound(ScheduleId),

    /// The booking does not exist or belongs to another user.
    #[error("Booking {0} not found")]
    BookingNotFound(BookingId),

    /// The driver's licence expires before the slot date.
    #[error("Driving licence expired on {expiry}, before the booking date {date}")]
    LicenseExpired { expiry: NaiveDate, date: NaiveDate },

    /// The slot is held by another booking.
    #[error("Schedule {0} is already reserved")]
    AlreadyReserved(ScheduleId),

    /// The driver already has as many active bookings as the membership allows.
    #[error("Booking limit of {limit} reached for this membership")]
    BookingLimitReached { limit: u32 },

    /// A promotion can only be applied to a pending session.
    #[error("Booking is {status}, promotions can only be applied to pending sessions")]
    BookingNotPending { status: BookingStatus },

    /// Only a pending booking can be confirmed.
    #[error("Booking is {status}, only pending bookings can be confirmed")]
    NotPending { status: BookingStatus },

    /// The operation requires a confirmed booking.
    #[error("Booking is {status}, expected Confirmed")]
    NotConfirmed { status: BookingStatus },

    /// Less than the minimum notice remains before the slot starts.
    #[error("Too late to cancel a booking starting at {starts_at}")]
    TooLateToCancel { starts_at: DateTime<Utc> },

    /// The target slot's vehicle is billed at a different hourly rate.
    #[error("Vehicle class differs: hourly rate {expected} expected, found {found}")]
    DifferentVehicleClass { expected: Money, found: Money },

    /// The target slot is not as long as the booked one.
    #[error("Slot duration differs: {expected_minutes} minutes expected, found {found_minutes}")]
    DurationMismatch {
        expected_minutes: i64,
        found_minutes: i64,
    },

    /// The booked slot starts too soon to be moved.
    #[error("Booking starting at {starts_at} is within the modification window")]
    WithinLeadWindow { starts_at: DateTime<Utc> },

    /// The payment callback reported a failed payment.
    #[error("Payment was not successful")]
    PaymentNotSuccessful,

    /// The amount charged no longer matches the booking total.
    #[error("Charged {charged} but booking total is {expected}")]
    AmountMismatch { charged: Money, expected: Money },
}

impl BookingError {
    pub(crate) fn duration_mismatch(expected: TimeDelta, found: TimeDelta) -> Self {
        BookingError::DurationMismatch {
            expected_minutes: expected.num_minutes(),
            found_minutes: found.num_minutes(),
        }
    }
}
