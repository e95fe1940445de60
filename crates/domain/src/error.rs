//! Domain error types.

use booking_store::StoreError;
use common::BookingId;
use thiserror::Error;

use crate::booking::BookingError;
use crate::pricing::PricingError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A booking transition or guard was rejected.
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// The price could not be computed.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// An error occurred in the booking store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted booking row could not be interpreted.
    #[error("Corrupt booking record {booking_id}: {reason}")]
    CorruptRecord { booking_id: BookingId, reason: String },
}

impl DomainError {
    /// Returns true if the error is a business-rule rejection rather than
    /// an infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DomainError::Booking(_) | DomainError::Pricing(_))
    }
}
