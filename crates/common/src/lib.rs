//! Shared types for the vehicle booking services.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{BookingId, ScheduleId, UserId};
