//! Booking state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The state of a booking in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──────► Confirmed ──────► Completed
///    │                │
///    ▼                ▼
/// SessionExpired   Cancelled
/// ```
///
/// A slot is reserved while its booking is Pending or Confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BookingStatus {
    /// Session opened, awaiting promotion and payment.
    #[default]
    Pending,

    /// Payment succeeded; the slot is held for the driver.
    Confirmed,

    /// The rental took place (terminal state).
    Completed,

    /// A confirmed booking was cancelled (terminal state).
    Cancelled,

    /// The session was abandoned before payment (terminal state).
    SessionExpired,
}

/// A persisted status string that names no known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl BookingStatus {
    /// Returns true if a promotion can be applied in this state.
    pub fn can_apply_promotion(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    /// Returns true if payment can confirm the booking in this state.
    pub fn can_confirm(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    /// Returns true if the session can be expired in this state.
    pub fn can_expire(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }

    /// Returns true if the booking can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    /// Returns true if the booking can move to another slot in this state.
    pub fn can_reschedule(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    /// Returns true if the booking can be completed in this state.
    pub fn can_complete(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::SessionExpired
        )
    }

    /// Returns true if a booking in this state holds its slot's reservation.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::SessionExpired => "SessionExpired",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BookingStatus::Pending),
            "Confirmed" => Ok(BookingStatus::Confirmed),
            "Completed" => Ok(BookingStatus::Completed),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            "SessionExpired" => Ok(BookingStatus::SessionExpired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
