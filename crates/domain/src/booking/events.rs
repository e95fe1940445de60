//! Booking transition events.

use chrono::{DateTime, Utc};
use common::{ScheduleId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::Quote;

/// A validated transition of a booking.
///
/// Command methods on [`Booking`](super::Booking) return an event;
/// [`Booking::apply`](super::Booking::apply) performs the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BookingEvent {
    /// A session was opened and the slot reserved.
    SessionCreated {
        user_id: UserId,
        schedule_id: ScheduleId,
        quote: Quote,
        at: DateTime<Utc>,
    },

    /// The booking was repriced with a promotion code.
    PromotionApplied { quote: Quote, at: DateTime<Utc> },

    /// Payment succeeded.
    Confirmed {
        confirmation_key: Option<Uuid>,
        at: DateTime<Utc>,
    },

    /// The session was abandoned and the slot released.
    SessionExpired { at: DateTime<Utc> },

    /// The booking was cancelled and the slot released.
    Cancelled { at: DateTime<Utc> },

    /// The booking moved to another slot.
    Rescheduled {
        from: ScheduleId,
        to: ScheduleId,
        at: DateTime<Utc>,
    },

    /// The rental took place.
    Completed { at: DateTime<Utc> },
}

impl BookingEvent {
    /// Returns the transition name, used as a metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::SessionCreated { .. } => "session_created",
            BookingEvent::PromotionApplied { .. } => "promotion_applied",
            BookingEvent::Confirmed { .. } => "confirmed",
            BookingEvent::SessionExpired { .. } => "session_expired",
            BookingEvent::Cancelled { .. } => "cancelled",
            BookingEvent::Rescheduled { .. } => "rescheduled",
            BookingEvent::Completed { .. } => "completed",
        }
    }

    /// Returns when the transition happened.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            BookingEvent::SessionCreated { at, .. }
            | BookingEvent::PromotionApplied { at, .. }
            | BookingEvent::Confirmed { at, .. }
            | BookingEvent::SessionExpired { at }
            | BookingEvent::Cancelled { at }
            | BookingEvent::Rescheduled { at, .. }
            | BookingEvent::Completed { at } => *at,
        }
    }
}
