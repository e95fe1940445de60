//! HTTP adapters for the collaborator services.
//!
//! Every adapter maps responses the same way: a 2xx body is decoded (and a
//! body that cannot be decoded is `Invalid`), 404 is `NotFound`, and any
//! other status or transport failure is `Unavailable`. Bodies are accepted
//! either bare or wrapped in the services' `{"message": .., "<resource>": ..}`
//! envelope, with snake_case or camelCase field names.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{Money, UserId};
use domain::{DriverProfile, Membership, Promotion};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use super::{
    BillingGateway, CollaboratorError, MembershipCatalog, PaymentReceipt, PaymentRequest,
    PromotionCatalog, UserDirectory,
};

/// Builds the HTTP client shared by all collaborator adapters.
pub fn collaborator_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

#[derive(Debug, Deserialize)]
struct UserBody {
    #[serde(alias = "membershipId")]
    membership_id: String,
    #[serde(alias = "licenseExpiry")]
    license_expiry: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct MembershipBody {
    #[serde(default, alias = "membershipId")]
    membership_id: Option<String>,
    #[serde(
        alias = "hourly_rate_discount",
        alias = "hourlyRateDiscount",
        alias = "hourlyRateDiscountPct"
    )]
    hourly_rate_discount_pct: Decimal,
    #[serde(alias = "bookingLimit")]
    booking_limit: u32,
}

#[derive(Debug, Deserialize)]
struct PromotionBody {
    #[serde(default, alias = "promo_code", alias = "promoCode")]
    code: Option<String>,
    #[serde(default, alias = "promotion_name", alias = "promotionName")]
    name: String,
    #[serde(alias = "discount_percentage", alias = "discountPct")]
    discount_pct: Decimal,
    #[serde(alias = "validFrom")]
    valid_from: NaiveDate,
    #[serde(alias = "validTo")]
    valid_to: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct ReceiptBody {
    #[serde(default, alias = "paymentId")]
    payment_id: Option<String>,
    #[serde(default)]
    amount: Option<Money>,
    #[serde(default, alias = "paymentSuccess")]
    payment_success: bool,
    #[serde(default)]
    message: Option<String>,
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, CollaboratorError> {
    let mut url = Url::parse(base)
        .map_err(|e| CollaboratorError::Unavailable(format!("bad service url {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| CollaboratorError::Unavailable(format!("bad service url {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn transport_error(e: reqwest::Error) -> CollaboratorError {
    if e.is_timeout() {
        CollaboratorError::Unavailable(format!("request timed out: {e}"))
    } else {
        CollaboratorError::Unavailable(e.to_string())
    }
}

/// Returns the body, or the `key` member of an enveloped body.
fn unwrap_envelope<T: DeserializeOwned>(body: Value, key: &str) -> Result<T, CollaboratorError> {
    let inner = match body {
        Value::Object(mut map) if map.contains_key(key) => match map.remove(key) {
            Some(Value::Null) | None => return Err(CollaboratorError::NotFound),
            Some(inner) => inner,
        },
        bare => bare,
    };
    serde_json::from_value(inner).map_err(|e| CollaboratorError::Invalid(e.to_string()))
}

async fn read_json(response: reqwest::Response) -> Result<Value, CollaboratorError> {
    response
        .json()
        .await
        .map_err(|e| CollaboratorError::Invalid(e.to_string()))
}

async fn get_resource<T: DeserializeOwned>(
    client: &Client,
    url: Url,
    key: &str,
) -> Result<T, CollaboratorError> {
    tracing::debug!(%url, "collaborator request");
    let response = client.get(url).send().await.map_err(transport_error)?;
    match response.status() {
        status if status.is_success() => unwrap_envelope(read_json(response).await?, key),
        StatusCode::NOT_FOUND => Err(CollaboratorError::NotFound),
        status => Err(CollaboratorError::Unavailable(format!(
            "unexpected status {status}"
        ))),
    }
}

/// User service client: drivers and membership tiers.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
}

impl HttpUserDirectory {
    /// Creates a client for the user service rooted at `base_url`
    /// (e.g. `http://localhost:8000/api/v1`).
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<DriverProfile, CollaboratorError> {
        let url = endpoint(&self.base_url, &["users", user_id.to_string().as_str()])?;
        let body: UserBody = get_resource(&self.client, url, "user").await?;
        Ok(DriverProfile {
            user_id,
            membership_id: body.membership_id,
            license_expiry: body.license_expiry,
        })
    }
}

#[async_trait]
impl MembershipCatalog for HttpUserDirectory {
    async fn get_membership(&self, membership_id: &str) -> Result<Membership, CollaboratorError> {
        let url = endpoint(&self.base_url, &["memberships", membership_id])?;
        let body: MembershipBody = get_resource(&self.client, url, "membership").await?;
        Ok(Membership {
            membership_id: body
                .membership_id
                .unwrap_or_else(|| membership_id.to_string()),
            hourly_rate_discount_pct: body.hourly_rate_discount_pct,
            booking_limit: body.booking_limit,
        })
    }
}

/// Promotion service client.
#[derive(Debug, Clone)]
pub struct HttpPromotionCatalog {
    client: Client,
    base_url: String,
}

impl HttpPromotionCatalog {
    /// Creates a client for the promotion service rooted at `base_url`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PromotionCatalog for HttpPromotionCatalog {
    async fn get_promotion(&self, code: &str) -> Result<Promotion, CollaboratorError> {
        let url = endpoint(&self.base_url, &["promotions", code])?;
        let body: PromotionBody = get_resource(&self.client, url, "promotion").await?;
        Ok(Promotion {
            code: body.code.unwrap_or_else(|| code.to_string()),
            name: body.name,
            discount_pct: body.discount_pct,
            valid_from: body.valid_from,
            valid_to: body.valid_to,
        })
    }
}

/// Billing service client.
#[derive(Debug, Clone)]
pub struct HttpBillingGateway {
    client: Client,
    base_url: String,
}

impl HttpBillingGateway {
    /// Creates a client for the billing service rooted at `base_url`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BillingGateway for HttpBillingGateway {
    async fn submit_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, CollaboratorError> {
        let url = endpoint(&self.base_url, &["payments"])?;
        tracing::debug!(%url, booking_id = %request.booking_id, "collaborator request");
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let body = read_json(response).await?;
                let outer_message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let receipt: ReceiptBody = unwrap_envelope(body, "payment")?;
                let fallback = if receipt.payment_success {
                    "Payment successful"
                } else {
                    "Payment declined"
                };
                Ok(PaymentReceipt {
                    payment_id: receipt.payment_id,
                    amount: receipt.amount.unwrap_or(request.amount),
                    payment_success: receipt.payment_success,
                    message: receipt
                        .message
                        .or(outer_message)
                        .unwrap_or_else(|| fallback.to_string()),
                })
            }
            StatusCode::BAD_REQUEST | StatusCode::PAYMENT_REQUIRED => {
                let message = read_json(response)
                    .await
                    .ok()
                    .and_then(|body| body.get("message")?.as_str().map(str::to_owned))
                    .unwrap_or_else(|| "Payment declined".to_string());
                Ok(PaymentReceipt::declined(request.amount, message))
            }
            StatusCode::NOT_FOUND => Err(CollaboratorError::NotFound),
            status => Err(CollaboratorError::Unavailable(format!(
                "unexpected status {status}"
            ))),
        }
    }

    async fn refund(&self, idempotency_key: Uuid) -> Result<(), CollaboratorError> {
        let key = idempotency_key.to_string();
        let url = endpoint(&self.base_url, &["payments", key.as_str(), "refund"])?;
        tracing::debug!(%url, "collaborator request");
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CollaboratorError::NotFound),
            status => Err(CollaboratorError::Unavailable(format!(
                "unexpected status {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::BookingId;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::services::CardDetails;

    fn client() -> Client {
        collaborator_client(Duration::from_millis(500)).unwrap()
    }

    fn payment(amount: i64) -> PaymentRequest {
        PaymentRequest {
            user_id: UserId::new(7),
            booking_id: BookingId::new(3),
            amount: Money::from_units(amount),
            card: CardDetails {
                number: "4111111111111111".to_string(),
                expiry: "05/30".to_string(),
                cvv: "123".to_string(),
            },
            idempotency_key: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_enveloped_snake_case_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "User found",
                "user": {
                    "user_id": 7,
                    "name": "Ana",
                    "membership_id": "Premium",
                    "license_expiry": "2031-12-31"
                }
            })))
            .mount(&server)
            .await;

        let users = HttpUserDirectory::new(client(), format!("{}/api/v1", server.uri()));
        let profile = users.get_user(UserId::new(7)).await.unwrap();

        assert_eq!(profile.membership_id, "Premium");
        assert_eq!(profile.license_expiry, "2031-12-31".parse().unwrap());
    }

    #[tokio::test]
    async fn test_bare_camel_case_membership() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/memberships/Gold"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourlyRateDiscountPct": 12.5,
                "bookingLimit": 4
            })))
            .mount(&server)
            .await;

        let users = HttpUserDirectory::new(client(), server.uri());
        let membership = users.get_membership("Gold").await.unwrap();

        assert_eq!(membership.membership_id, "Gold");
        assert_eq!(membership.hourly_rate_discount_pct, Decimal::new(125, 1));
        assert_eq!(membership.booking_limit, 4);
    }

    #[tokio::test]
    async fn test_not_found_and_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/promotions/NOPE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Promotion not found",
                "promotion": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let promotions = HttpPromotionCatalog::new(client(), server.uri());
        assert_eq!(
            promotions.get_promotion("NOPE").await,
            Err(CollaboratorError::NotFound)
        );

        let users = HttpUserDirectory::new(client(), server.uri());
        assert!(matches!(
            users.get_user(UserId::new(1)).await,
            Err(CollaboratorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/promotions/SPRING5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promotion": { "promo_code": "SPRING5" }
            })))
            .mount(&server)
            .await;

        let promotions = HttpPromotionCatalog::new(client(), server.uri());
        assert!(matches!(
            promotions.get_promotion("SPRING5").await,
            Err(CollaboratorError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_promotion_fields_from_promotion_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/promotions/SPRING5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Promotion found",
                "promotion": {
                    "promo_code": "SPRING5",
                    "promotion_name": "Spring sale",
                    "discount_percentage": 5,
                    "valid_from": "2030-03-01",
                    "valid_to": "2030-05-31"
                }
            })))
            .mount(&server)
            .await;

        let promotions = HttpPromotionCatalog::new(client(), server.uri());
        let promotion = promotions.get_promotion("SPRING5").await.unwrap();

        assert_eq!(promotion.name, "Spring sale");
        assert_eq!(promotion.discount_pct, Decimal::from(5));
        assert_eq!(promotion.valid_to, "2030-05-31".parse().unwrap());
    }

    #[tokio::test]
    async fn test_payment_sends_camel_case_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .and(body_partial_json(json!({
                "userId": 7,
                "bookingId": 3,
                "card": { "number": "4111111111111111" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "paymentId": "PAY-0009",
                "amount": 18.0,
                "paymentSuccess": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let billing = HttpBillingGateway::new(client(), server.uri());
        let receipt = billing.submit_payment(&payment(18)).await.unwrap();

        assert!(receipt.payment_success);
        assert_eq!(receipt.payment_id.as_deref(), Some("PAY-0009"));
        assert_eq!(receipt.amount, Money::from_units(18));
    }

    #[tokio::test]
    async fn test_payment_refusal_is_a_declined_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "message": "Insufficient balance",
                "payment": null
            })))
            .mount(&server)
            .await;

        let billing = HttpBillingGateway::new(client(), server.uri());
        let receipt = billing.submit_payment(&payment(18)).await.unwrap();

        assert!(!receipt.payment_success);
        assert_eq!(receipt.message, "Insufficient balance");
    }

    #[tokio::test]
    async fn test_receipt_without_success_flag_is_declined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment": { "paymentId": "PAY-0010", "amount": 18.0 }
            })))
            .mount(&server)
            .await;

        let billing = HttpBillingGateway::new(client(), server.uri());
        let receipt = billing.submit_payment(&payment(18)).await.unwrap();

        assert!(!receipt.payment_success);
        assert_eq!(receipt.message, "Payment declined");
    }

    #[tokio::test]
    async fn test_refund_posts_to_the_charge_key() {
        let server = MockServer::start().await;
        let request = payment(18);
        Mock::given(method("POST"))
            .and(path(format!(
                "/payments/{}/refund",
                request.idempotency_key
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Refunded"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let billing = HttpBillingGateway::new(client(), server.uri());
        billing.refund(request.idempotency_key).await.unwrap();
        assert_eq!(
            billing.refund(Uuid::new_v4()).await,
            Err(CollaboratorError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/7"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let users = HttpUserDirectory::new(client(), server.uri());
        assert!(matches!(
            users.get_user(UserId::new(7)).await,
            Err(CollaboratorError::Unavailable(_))
        ));
    }
}
