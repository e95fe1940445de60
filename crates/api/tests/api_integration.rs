//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, UserId};
use domain::{FixedClock, LeadTimePolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

use api::demo::{DEMO_CARD_CVV, DEMO_CARD_NUMBER, DemoServices};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: Router,
    demo: DemoServices,
    clock: FixedClock,
}

async fn setup() -> TestApp {
    let clock = FixedClock::new("2030-05-01T00:00:00Z".parse().unwrap());
    let (state, demo) = api::create_default_state(LeadTimePolicy::default(), Arc::new(clock.clone()))
        .await
        .unwrap();
    let router = api::create_app(state, get_metrics_handle());
    TestApp {
        router,
        demo,
        clock,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn start_session(&self, user_id: i64, schedule_id: i64) -> i64 {
        let (status, json) = self
            .send(
                "POST",
                &format!("/api/v1/create-booking-session/{user_id}/{schedule_id}"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["booking"]["booking_id"].as_i64().unwrap()
    }

    async fn confirmed_booking(&self, user_id: i64, schedule_id: i64) -> i64 {
        let booking_id = self.start_session(user_id, schedule_id).await;
        let (status, _) = self
            .send(
                "POST",
                &format!("/api/v1/confirm-booking/{user_id}/{booking_id}"),
                Some(json!({ "paymentSuccess": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        booking_id
    }
}

fn card() -> Value {
    json!({
        "number": DEMO_CARD_NUMBER,
        "expiry": "12/33",
        "cvv": DEMO_CARD_CVV,
    })
}

fn assert_amount(value: &Value, expected: f64) {
    let actual = value.as_f64().unwrap();
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    app.send("GET", "/api/v1/vehicle/1", None).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_full_booking_flow() {
    let app = setup().await;

    // Premium member: 2h at 10/h with 10% off.
    let (status, json) = app
        .send("POST", "/api/v1/create-booking-session/1/1", None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["booking"]["status"], "Pending");
    assert_eq!(json["booking"]["type"], "Sedan");
    assert_amount(&json["booking"]["base_cost"], 20.0);
    assert_amount(&json["booking"]["total_amount"], 18.0);
    let booking_id = json["booking"]["booking_id"].as_i64().unwrap();

    let (status, json) = app
        .send(
            "POST",
            &format!("/api/v1/add-promotion-code/1/{booking_id}/WELCOME10"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["promo_code"], "WELCOME10");
    assert_amount(&json["booking"]["promotion_discount"], 1.8);
    assert_amount(&json["booking"]["discount_applied"], 3.8);
    assert_amount(&json["booking"]["total_amount"], 16.2);

    let (status, json) = app
        .send("GET", &format!("/api/v1/verify-booking/1/{booking_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["status"], "Pending");

    let (status, json) = app
        .send(
            "POST",
            &format!("/api/v1/make-payment/1/{booking_id}"),
            Some(card()),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["booking"]["status"], "Confirmed");
    assert_eq!(json["payment"]["payment_success"], true);
    assert_eq!(
        app.demo.billing.balance(UserId::new(1)),
        Some("483.8".parse::<Money>().unwrap())
    );

    let (status, json) = app.send("GET", "/api/v1/upcoming-rentals/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["bookings"].as_array().unwrap().len(), 1);

    let (status, json) = app
        .send("POST", &format!("/api/v1/complete-booking/1/{booking_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["status"], "Completed");

    let (_, json) = app.send("GET", "/api/v1/rental-history/1", None).await;
    assert_eq!(json["bookings"][0]["booking_id"], booking_id);
}

#[tokio::test]
async fn test_reserved_slot_conflicts() {
    let app = setup().await;
    app.start_session(1, 2).await;

    let (status, json) = app
        .send("POST", "/api/v1/create-booking-session/2/2", None)
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["booking"].is_null());
}

#[tokio::test]
async fn test_cancelled_session_releases_slot() {
    let app = setup().await;
    let booking_id = app.start_session(1, 2).await;

    let (status, json) = app
        .send(
            "DELETE",
            &format!("/api/v1/cancel-booking-session/1/{booking_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["status"], "SessionExpired");

    app.start_session(2, 2).await;
}

#[tokio::test]
async fn test_malformed_id_returns_400() {
    let app = setup().await;

    let (status, json) = app
        .send("POST", "/api/v1/create-booking-session/abc/1", None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("user id"));
}

#[tokio::test]
async fn test_unknown_user_returns_404() {
    let app = setup().await;

    let (status, _) = app
        .send("POST", "/api/v1/create-booking-session/99/1", None)
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_promotion_errors() {
    let app = setup().await;
    let booking_id = app.start_session(2, 3).await;

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/add-promotion-code/2/{booking_id}/NOPE"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/add-promotion-code/2/{booking_id}/SUMMER15"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_callback() {
    let app = setup().await;
    let booking_id = app.start_session(1, 1).await;
    let uri = format!("/api/v1/confirm-booking/1/{booking_id}");

    let (status, _) = app
        .send("POST", &uri, Some(json!({ "paymentSuccess": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("POST", &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stale = json!({ "paymentSuccess": true, "amount": 20.0 });
    let (status, json) = app.send("POST", &uri, Some(stale)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["message"].as_str().unwrap().contains("booking total"));

    let key = "6f1c2b1e-3f55-4f0e-9d4a-1d2e3c4b5a69";
    let body = json!({ "paymentSuccess": true, "idempotencyKey": key, "amount": 18.0 });
    let (status, json) = app.send("POST", &uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["status"], "Confirmed");

    // Redelivery of the same callback is accepted.
    let (status, _) = app.send("POST", &uri, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_reschedule_to_same_class_slot() {
    let app = setup().await;
    let booking_id = app.confirmed_booking(1, 1).await;

    let (status, json) = app
        .send(
            "GET",
            &format!("/api/v1/reschedule-options/1/{booking_id}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let options = json["vehicles"].as_array().unwrap();
    assert!(options.iter().any(|v| v["schedule_id"] == 3));
    assert!(options.iter().all(|v| v["type"] == "Sedan"));

    let (status, json) = app
        .send(
            "PUT",
            &format!("/api/v1/update-booking/1/{booking_id}/3"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["schedule_id"], 3);
    assert_eq!(json["booking"]["brand"], "Hyundai");

    let (_, json) = app.send("GET", "/api/v1/vehicle/1", None).await;
    assert_eq!(json["vehicle"]["is_reserved"], false);
    let (_, json) = app.send("GET", "/api/v1/vehicle/3", None).await;
    assert_eq!(json["vehicle"]["is_reserved"], true);

    // The SUV is a different class.
    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/v1/update-booking/1/{booking_id}/5"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_inside_lead_window_is_rejected() {
    let app = setup().await;
    let booking_id = app.confirmed_booking(1, 1).await;
    let uri = format!("/api/v1/cancel-booking/1/{booking_id}");

    // Slot starts 2030-05-02 09:00 in Singapore, 01:00 UTC.
    app.clock.set("2030-05-01T12:00:00Z".parse().unwrap());
    let (status, json) = app.send("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().is_some());

    app.clock.set("2030-05-01T00:00:00Z".parse().unwrap());
    let (status, json) = app.send("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["status"], "Cancelled");
}

#[tokio::test]
async fn test_available_vehicles() {
    let app = setup().await;
    app.start_session(1, 1).await;

    let (status, json) = app.send("GET", "/api/v1/vehicles/2030-05-02", None).await;
    assert_eq!(status, StatusCode::OK);
    let vehicles = json["vehicles"].as_array().unwrap();
    assert_eq!(vehicles.len(), 5);
    assert!(vehicles.iter().all(|v| v["schedule_id"] != 1));

    let (status, _) = app.send("GET", "/api/v1/vehicles/tomorrow", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("GET", "/api/v1/vehicle/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_quote_with_promotion() {
    let app = setup().await;

    // VIP member: 2h SUV at 15/h, 20% membership then 10% promotion.
    let (status, json) = app
        .send("GET", "/api/v1/quote/3/5?promo_code=WELCOME10", None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_amount(&json["quote"]["base_cost"], 30.0);
    assert_amount(&json["quote"]["membership_discount"], 6.0);
    assert_amount(&json["quote"]["promotion_discount"], 2.4);
    assert_amount(&json["quote"]["total_amount"], 21.6);

    let (_, json) = app.send("GET", "/api/v1/quote/3/5", None).await;
    assert_amount(&json["quote"]["total_amount"], 24.0);
}

#[tokio::test]
async fn test_other_users_booking_is_not_found() {
    let app = setup().await;
    let booking_id = app.start_session(1, 1).await;

    let (status, _) = app
        .send("GET", &format!("/api/v1/bookings/2/{booking_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = app
        .send("GET", &format!("/api/v1/bookings/1/{booking_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["booking"]["user_id"], 1);
}
