//! HTTP API server with observability for the vehicle booking service.
//!
//! Exposes the booking session saga and the booking lifecycle as REST
//! endpoints under `/api/v1`, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod demo;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use booking_store::{BookingStore, InMemoryBookingStore, StoreError};
use domain::{BookingService, Clock, LeadTimePolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    BookingSaga, Collaborators, HttpBillingGateway, HttpPromotionCatalog, HttpUserDirectory,
    collaborator_client,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::{
    Config, DEFAULT_BILLING_SERVICE_URL, DEFAULT_PROMOTION_SERVICE_URL, DEFAULT_USER_SERVICE_URL,
};
use demo::DemoServices;

/// Shared application state.
pub struct AppState<S: BookingStore> {
    pub saga: BookingSaga<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: BookingStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{bookings, vehicles};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api = Router::new()
        .route(
            "/create-booking-session/{user_id}/{schedule_id}",
            post(bookings::create_session::<S>),
        )
        .route(
            "/add-promotion-code/{user_id}/{booking_id}/{promo_code}",
            post(bookings::add_promotion::<S>),
        )
        .route(
            "/verify-booking/{user_id}/{booking_id}",
            get(bookings::verify::<S>),
        )
        .route(
            "/cancel-booking-session/{user_id}/{booking_id}",
            delete(bookings::cancel_session::<S>),
        )
        .route(
            "/make-payment/{user_id}/{booking_id}",
            post(bookings::make_payment::<S>),
        )
        .route(
            "/confirm-booking/{user_id}/{booking_id}",
            post(bookings::confirm::<S>),
        )
        .route(
            "/cancel-booking/{user_id}/{booking_id}",
            delete(bookings::cancel::<S>),
        )
        .route(
            "/update-booking/{user_id}/{booking_id}/{schedule_id}",
            put(bookings::reschedule::<S>),
        )
        .route(
            "/complete-booking/{user_id}/{booking_id}",
            post(bookings::complete::<S>),
        )
        .route("/bookings/{user_id}/{booking_id}", get(bookings::get::<S>))
        .route("/upcoming-rentals/{user_id}", get(bookings::upcoming::<S>))
        .route("/rental-history/{user_id}", get(bookings::history::<S>))
        .route(
            "/reschedule-options/{user_id}/{booking_id}",
            get(bookings::reschedule_options::<S>),
        )
        .route("/vehicles/{date}", get(vehicles::available::<S>))
        .route("/vehicle/{schedule_id}", get(vehicles::detail::<S>))
        .route(
            "/quote/{user_id}/{schedule_id}",
            get(vehicles::quote::<S>),
        );

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires a store and collaborators into the application state.
pub fn create_state<S: BookingStore>(
    store: S,
    collaborators: Collaborators,
    policy: LeadTimePolicy,
    clock: Arc<dyn Clock>,
) -> Arc<AppState<S>> {
    let bookings = BookingService::new(store, policy);
    Arc::new(AppState {
        saga: BookingSaga::new(bookings, collaborators, clock),
    })
}

/// Builds HTTP clients for the user, promotion and billing services.
///
/// Collaborators without a configured URL use their default address.
pub fn http_collaborators(config: &Config) -> Result<Collaborators, reqwest::Error> {
    let client = collaborator_client(config.collaborator_timeout)?;
    let url = |configured: &Option<String>, default: &str| {
        configured.clone().unwrap_or_else(|| default.to_string())
    };

    let users = Arc::new(HttpUserDirectory::new(
        client.clone(),
        url(&config.user_service_url, DEFAULT_USER_SERVICE_URL),
    ));
    Ok(Collaborators {
        users: users.clone(),
        memberships: users,
        promotions: Arc::new(HttpPromotionCatalog::new(
            client.clone(),
            url(&config.promotion_service_url, DEFAULT_PROMOTION_SERVICE_URL),
        )),
        billing: Arc::new(HttpBillingGateway::new(
            client,
            url(&config.billing_service_url, DEFAULT_BILLING_SERVICE_URL),
        )),
    })
}

/// Creates the default application state: a seeded in-memory store and
/// demo collaborators.
pub async fn create_default_state(
    policy: LeadTimePolicy,
    clock: Arc<dyn Clock>,
) -> Result<(Arc<AppState<InMemoryBookingStore>>, DemoServices), StoreError> {
    let today = policy.today(clock.now());
    let store = InMemoryBookingStore::new();
    demo::seed_fleet(&store, today).await?;

    let services = DemoServices::new(clock.clone(), today);
    let state = create_state(store, services.collaborators(), policy, clock);
    Ok((state, services))
}
