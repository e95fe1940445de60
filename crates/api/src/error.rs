//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{BookingError, DomainError, PricingError};
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
///
/// Every error is rendered as `{"message": "...", "booking": null}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path segment, query or body.
    BadRequest(String),
    /// Saga, state machine or pricing error.
    Saga(SagaError),
}

impl ApiError {
    /// Returns the status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Saga(err) => saga_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Saga(err) => err.to_string(),
        };

        metrics::counter!("api_errors_total", "status" => status.as_str().to_owned())
            .increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "message": message, "booking": null });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::UserNotFound(_) | SagaError::MembershipNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::PaymentDeclined(_) => StatusCode::BAD_REQUEST,
        SagaError::PaymentInProgress(_) => StatusCode::CONFLICT,
        SagaError::Collaborator { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        SagaError::Domain(err) => domain_status(err),
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Booking(err) => match err {
            BookingError::ScheduleNotFound(_) | BookingError::BookingNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            BookingError::AlreadyReserved(_)
            | BookingError::BookingLimitReached { .. }
            | BookingError::BookingNotPending { .. }
            | BookingError::NotPending { .. }
            | BookingError::NotConfirmed { .. }
            | BookingError::AmountMismatch { .. } => StatusCode::CONFLICT,
            BookingError::LicenseExpired { .. }
            | BookingError::TooLateToCancel { .. }
            | BookingError::DifferentVehicleClass { .. }
            | BookingError::DurationMismatch { .. }
            | BookingError::WithinLeadWindow { .. }
            | BookingError::PaymentNotSuccessful => StatusCode::BAD_REQUEST,
        },
        DomainError::Pricing(PricingError::PromoNotFound { .. }) => StatusCode::NOT_FOUND,
        DomainError::Pricing(_) => StatusCode::BAD_REQUEST,
        DomainError::Store(_) | DomainError::CorruptRecord { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Saga(SagaError::Domain(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::{BookingId, Money, ScheduleId, UserId};
    use saga::CollaboratorError;

    use super::*;

    #[test]
    fn test_state_conflicts_are_409() {
        let err = ApiError::from(DomainError::from(BookingError::AlreadyReserved(
            ScheduleId::new(1),
        )));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(DomainError::from(BookingError::BookingLimitReached {
            limit: 2,
        }));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unknown_references_are_404() {
        assert_eq!(
            ApiError::from(SagaError::UserNotFound(UserId::new(1))).status(),
            StatusCode::NOT_FOUND
        );
        let err = ApiError::from(DomainError::from(PricingError::PromoNotFound {
            code: "NOPE".to_string(),
        }));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_failures_are_400() {
        assert_eq!(
            ApiError::from(DomainError::from(BookingError::PaymentNotSuccessful)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SagaError::PaymentDeclined("Insufficient balance".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadRequest("Invalid user id: x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_payment_races_are_409() {
        assert_eq!(
            ApiError::from(SagaError::PaymentInProgress(BookingId::new(3))).status(),
            StatusCode::CONFLICT
        );
        let err = ApiError::from(DomainError::from(BookingError::AmountMismatch {
            charged: Money::from_units(18),
            expected: "17.1".parse().unwrap(),
        }));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_collaborator_outage_is_500() {
        let err = ApiError::from(SagaError::Collaborator {
            service: "billing",
            source: CollaboratorError::Unavailable("connection refused".into()),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
