//! Saga error types.

use common::{BookingId, UserId};
use domain::DomainError;
use thiserror::Error;

use crate::services::CollaboratorError;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The user service does not know the driver.
    #[error("User {0} not found")]
    UserNotFound(UserId),

    /// The driver's membership tier does not exist.
    #[error("Membership {0} not found")]
    MembershipNotFound(String),

    /// A collaborator could not be reached or returned an unusable response.
    #[error("{service} service error: {source}")]
    Collaborator {
        service: &'static str,
        #[source]
        source: CollaboratorError,
    },

    /// Billing refused the charge.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Another payment for the booking has not finished yet.
    #[error("Payment for booking {0} is already in progress")]
    PaymentInProgress(BookingId),

    /// The booking state machine or pricing engine rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl SagaError {
    pub(crate) fn collaborator(service: &'static str, source: CollaboratorError) -> Self {
        SagaError::Collaborator { service, source }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
