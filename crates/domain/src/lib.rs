//! Domain layer for the vehicle booking service.
//!
//! This crate provides:
//! - The pricing engine computing base cost and layered discounts
//! - The booking state machine with its guards and lead-time rules
//! - `BookingService`, which runs every transition inside one store transaction

pub mod booking;
pub mod clock;
pub mod error;
pub mod pricing;

pub use booking::{
    Booking, BookingDetails, BookingError, BookingEvent, BookingService, BookingStatus,
    DriverProfile, LeadTimePolicy, Membership, Promotion, ScheduleSlot, SlotOffer, UnknownStatus,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::DomainError;
pub use pricing::{PricingError, PricingInput, Quote, compute_amount};
