//! Vehicle availability and pricing preview endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use booking_store::BookingStore;
use chrono::{NaiveDate, NaiveTime};
use common::{Money, ScheduleId, UserId};
use domain::{Quote, SlotOffer};
use serde::{Deserialize, Serialize};

use super::parse_segment;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub promo_code: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct VehicleResponse {
    pub schedule_id: ScheduleId,
    pub vehicle_id: i64,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub brand: String,
    pub model: String,
    pub license_plate: String,
    pub hourly_rate: Money,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_reserved: bool,
    pub base_cost: Money,
}

impl From<SlotOffer> for VehicleResponse {
    fn from(offer: SlotOffer) -> Self {
        let slot = offer.slot;
        Self {
            schedule_id: slot.schedule_id,
            vehicle_id: slot.vehicle_id,
            vehicle_type: slot.vehicle_type,
            brand: slot.brand,
            model: slot.model,
            license_plate: slot.license_plate,
            hourly_rate: slot.hourly_rate,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            is_reserved: slot.is_reserved,
            base_cost: offer.base_cost,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VehicleListResponse {
    pub message: String,
    pub vehicles: Vec<VehicleResponse>,
}

#[derive(Debug, Serialize)]
pub struct VehicleDetailResponse {
    pub message: String,
    pub vehicle: VehicleResponse,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub message: String,
    pub quote: Quote,
}

// -- Handlers --

/// GET /api/v1/vehicles/{date} — unreserved slots on a date.
#[tracing::instrument(skip(state))]
pub async fn available<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(date): Path<String>,
) -> Result<Json<VehicleListResponse>, ApiError> {
    let date: NaiveDate = parse_segment(&date, "date")?;
    let offers = state.saga.available_slots(date).await?;

    Ok(Json(VehicleListResponse {
        message: format!("{} vehicles available on {date}", offers.len()),
        vehicles: offers.into_iter().map(VehicleResponse::from).collect(),
    }))
}

/// GET /api/v1/vehicle/{schedule_id} — one slot with its vehicle.
#[tracing::instrument(skip(state))]
pub async fn detail<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(schedule_id): Path<String>,
) -> Result<Json<VehicleDetailResponse>, ApiError> {
    let schedule_id: ScheduleId = parse_segment(&schedule_id, "schedule id")?;
    let offer = state.saga.schedule_details(schedule_id).await?;

    Ok(Json(VehicleDetailResponse {
        message: "Vehicle found".to_string(),
        vehicle: offer.into(),
    }))
}

/// GET /api/v1/quote/{user_id}/{schedule_id}?promo_code= — price a slot
/// for a driver without reserving it.
#[tracing::instrument(skip(state, params))]
pub async fn quote<S: BookingStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, schedule_id)): Path<(String, String)>,
    params: Result<Query<QuoteParams>, QueryRejection>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let user_id: UserId = parse_segment(&user_id, "user id")?;
    let schedule_id: ScheduleId = parse_segment(&schedule_id, "schedule id")?;
    let Query(params) = params?;
    let promo_code = params.promo_code.as_deref().filter(|c| !c.is_empty());

    let quote = state.saga.quote(user_id, schedule_id, promo_code).await?;

    Ok(Json(QuoteResponse {
        message: "Quote calculated".to_string(),
        quote,
    }))
}
