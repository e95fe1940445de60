//! Booking session and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking_store::BookingStore;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{BookingId, Money, ScheduleId, UserId};
use domain::{BookingDetails, BookingStatus};
use saga::{CardDetails, Confirmation, PaymentReceipt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_segment;
use super::vehicles::VehicleResponse;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

/// Billing's payment callback.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBookingRequest {
    #[serde(alias = "payment_success")]
    pub payment_success: bool,
    #[serde(default, alias = "idempotency_key")]
    pub idempotency_key: Option<Uuid>,
    /// Amount billing debited, checked against the booking total.
    #[serde(default)]
    pub amount: Option<Money>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: BookingId,
    pub schedule_id: ScheduleId,
    pub user_id: UserId,
    pub status: BookingStatus,
    pub base_cost: Money,
    pub promo_code: Option<String>,
    pub membership_discount: Money,
    pub promotion_discount: Money,
    pub discount_applied: Money,
    pub total_amount: Money,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub brand: String,
    pub model: String,
    pub license_plate: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&BookingDetails> for BookingResponse {
    fn from(details: &BookingDetails) -> Self {
        let booking = &details.booking;
        let slot = &details.slot;
        Self {
            booking_id: booking.booking_id(),
            schedule_id: booking.schedule_id(),
            user_id: booking.user_id(),
            status: booking.status(),
            base_cost: booking.base_cost(),
            promo_code: booking.promo_code().map(str::to_owned),
            membership_discount: booking.membership_discount(),
            promotion_discount: booking.promotion_discount(),
            discount_applied: booking.total_discount(),
            total_amount: booking.total_amount(),
            vehicle_type: slot.vehicle_type.clone(),
            brand: slot.brand.clone(),
            model: slot.model.clone(),
            license_plate: slot.license_plate.clone(),
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            created_at: booking.created_at(),
            updated_at: booking.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingEnvelope {
    pub message: String,
    pub booking: BookingResponse,
}

impl BookingEnvelope {
    fn new(message: impl Into<String>, details: &BookingDetails) -> Self {
        Self {
            message: message.into(),
            booking: details.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingListEnvelope {
    pub message: String,
    pub bookings: Vec<BookingResponse>,
}

#[derive(Debug, Serialize)]
pub struct PaymentEnvelope {
    pub message: String,
    pub booking: BookingResponse,
    pub payment: PaymentReceipt,
}

#[derive(Debug, Serialize)]
pub struct RescheduleOptionsEnvelope {
    pub message: String,
    pub vehicles: Vec<VehicleResponse>,
}

fn parse_user_booking(user_id: &str, booking_id: &str) -> Result<(UserId, BookingId), ApiError> {
    Ok((
        parse_segment(user_id, "user id")?,
        parse_segment(booking_id, "booking id")?,
    ))
}

// -- Handlers --

/// POST /api/v1/create-booking-session/{user_id}/{schedule_id}
#[tracing::instrument(skip(state))]
pub async fn create_session<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, schedule_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<BookingEnvelope>), ApiError> {
    let user_id: UserId = parse_segment(&user_id, "user id")?;
    let schedule_id: ScheduleId = parse_segment(&schedule_id, "schedule id")?;

    let details = state.saga.start_session(user_id, schedule_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingEnvelope::new("Booking session created", &details)),
    ))
}

/// POST /api/v1/add-promotion-code/{user_id}/{booking_id}/{promo_code}
#[tracing::instrument(skip(state))]
pub async fn add_promotion<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id, promo_code)): Path<(String, String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let code = promo_code.trim();
    if code.is_empty() {
        return Err(ApiError::BadRequest("Promotion code is required".to_string()));
    }

    let details = state.saga.apply_promotion(user_id, booking_id, code).await?;

    Ok(Json(BookingEnvelope::new("Promotion code applied", &details)))
}

/// GET /api/v1/verify-booking/{user_id}/{booking_id}
#[tracing::instrument(skip(state))]
pub async fn verify<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let details = state.saga.verify_session(user_id, booking_id).await?;
    Ok(Json(BookingEnvelope::new("Booking session verified", &details)))
}

/// DELETE /api/v1/cancel-booking-session/{user_id}/{booking_id}
#[tracing::instrument(skip(state))]
pub async fn cancel_session<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let details = state.saga.cancel_session(user_id, booking_id).await?;
    Ok(Json(BookingEnvelope::new("Booking session cancelled", &details)))
}

/// POST /api/v1/make-payment/{user_id}/{booking_id}
///
/// Charges the session total to the card in the body and confirms the
/// booking once billing accepts.
#[tracing::instrument(skip(state, body))]
pub async fn make_payment<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
    body: Result<Json<CardDetails>, JsonRejection>,
) -> Result<Json<PaymentEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let Json(card) = body?;

    let outcome = state.saga.request_payment(user_id, booking_id, card).await?;

    Ok(Json(PaymentEnvelope {
        message: "Payment successful, booking confirmed".to_string(),
        booking: (&outcome.details).into(),
        payment: outcome.receipt,
    }))
}

/// POST /api/v1/confirm-booking/{user_id}/{booking_id}
#[tracing::instrument(skip(state, body))]
pub async fn confirm<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
    body: Result<Json<ConfirmBookingRequest>, JsonRejection>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let Json(req) = body?;

    let confirmation = Confirmation {
        payment_success: req.payment_success,
        idempotency_key: req.idempotency_key,
        amount: req.amount,
    };
    let details = state
        .saga
        .confirm_booking(user_id, booking_id, confirmation)
        .await?;

    Ok(Json(BookingEnvelope::new("Booking confirmed", &details)))
}

/// DELETE /api/v1/cancel-booking/{user_id}/{booking_id}
#[tracing::instrument(skip(state))]
pub async fn cancel<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let details = state.saga.cancel_booking(user_id, booking_id).await?;
    Ok(Json(BookingEnvelope::new("Booking cancelled", &details)))
}

/// PUT /api/v1/update-booking/{user_id}/{booking_id}/{schedule_id}
#[tracing::instrument(skip(state))]
pub async fn reschedule<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id, schedule_id)): Path<(String, String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let target: ScheduleId = parse_segment(&schedule_id, "schedule id")?;

    let details = state.saga.reschedule(user_id, booking_id, target).await?;

    Ok(Json(BookingEnvelope::new("Booking updated", &details)))
}

/// POST /api/v1/complete-booking/{user_id}/{booking_id}
#[tracing::instrument(skip(state))]
pub async fn complete<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let details = state.saga.complete_booking(user_id, booking_id).await?;
    Ok(Json(BookingEnvelope::new("Booking completed", &details)))
}

/// GET /api/v1/bookings/{user_id}/{booking_id}
#[tracing::instrument(skip(state))]
pub async fn get<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let details = state.saga.get_booking(user_id, booking_id).await?;
    Ok(Json(BookingEnvelope::new("Booking found", &details)))
}

/// GET /api/v1/upcoming-rentals/{user_id}
#[tracing::instrument(skip(state))]
pub async fn upcoming<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<BookingListEnvelope>, ApiError> {
    let user_id: UserId = parse_segment(&user_id, "user id")?;
    let bookings = state.saga.upcoming_rentals(user_id).await?;

    Ok(Json(BookingListEnvelope {
        message: format!("{} upcoming rentals", bookings.len()),
        bookings: bookings.iter().map(BookingResponse::from).collect(),
    }))
}

/// GET /api/v1/rental-history/{user_id}
#[tracing::instrument(skip(state))]
pub async fn history<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<BookingListEnvelope>, ApiError> {
    let user_id: UserId = parse_segment(&user_id, "user id")?;
    let bookings = state.saga.rental_history(user_id).await?;

    Ok(Json(BookingListEnvelope {
        message: format!("{} completed rentals", bookings.len()),
        bookings: bookings.iter().map(BookingResponse::from).collect(),
    }))
}

/// GET /api/v1/reschedule-options/{user_id}/{booking_id}
#[tracing::instrument(skip(state))]
pub async fn reschedule_options<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, booking_id)): Path<(String, String)>,
) -> Result<Json<RescheduleOptionsEnvelope>, ApiError> {
    let (user_id, booking_id) = parse_user_booking(&user_id, &booking_id)?;
    let offers = state.saga.reschedule_options(user_id, booking_id).await?;

    Ok(Json(RescheduleOptionsEnvelope {
        message: format!("{} alternative slots", offers.len()),
        vehicles: offers.into_iter().map(VehicleResponse::from).collect(),
    }))
}
