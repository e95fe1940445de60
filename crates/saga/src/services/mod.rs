//! Collaborator service traits with in-memory and HTTP implementations.

pub mod billing;
pub mod http;
pub mod promotions;
pub mod users;

use async_trait::async_trait;
use common::{BookingId, Money, UserId};
use domain::{DriverProfile, Membership, Promotion};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use billing::{InMemoryBillingGateway, StoredCard};
pub use http::{HttpBillingGateway, HttpPromotionCatalog, HttpUserDirectory, collaborator_client};
pub use promotions::InMemoryPromotionCatalog;
pub use users::InMemoryUserDirectory;

/// Errors returned by collaborator services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The requested resource does not exist.
    #[error("not found")]
    NotFound,

    /// The service could not be reached or failed.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a body that could not be understood.
    #[error("invalid response: {0}")]
    Invalid(String),
}

/// Driver lookup in the user service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the driver's membership id and licence expiry.
    async fn get_user(&self, user_id: UserId) -> Result<DriverProfile, CollaboratorError>;
}

/// Membership tiers owned by the user service.
#[async_trait]
pub trait MembershipCatalog: Send + Sync {
    /// Returns the discount and booking limit of a membership tier.
    async fn get_membership(&self, membership_id: &str) -> Result<Membership, CollaboratorError>;
}

/// Promotion codes owned by the promotion service.
#[async_trait]
pub trait PromotionCatalog: Send + Sync {
    /// Returns the promotion registered under `code`.
    async fn get_promotion(&self, code: &str) -> Result<Promotion, CollaboratorError>;
}

/// Card payments owned by the billing service.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Validates the card and debits the invoice total.
    ///
    /// A declined card is a successful call returning a receipt with
    /// `payment_success == false`. Submitting the same idempotency key twice
    /// charges once.
    async fn submit_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, CollaboratorError>;

    /// Returns a successful charge to the card it was taken from.
    ///
    /// Fails with `NotFound` when no charge was taken under the key.
    async fn refund(&self, idempotency_key: Uuid) -> Result<(), CollaboratorError>;
}

/// Card details supplied by the driver at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    #[serde(alias = "card_number", alias = "cardNumber")]
    pub number: String,
    /// Card expiry in `MM/YY` form.
    #[serde(alias = "card_expiry", alias = "cardExpiry")]
    pub expiry: String,
    pub cvv: String,
}

/// A charge submitted to billing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub user_id: UserId,
    pub booking_id: BookingId,
    pub amount: Money,
    pub card: CardDetails,
    pub idempotency_key: Uuid,
}

/// Namespace for payment idempotency keys.
const PAYMENT_KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_0c3e_52a4_4d6e_9f0b_3a7c_e1d2_8845);

/// Derives the idempotency key for charging `amount` against a booking.
///
/// Every attempt to pay the same total for the same booking shares a key,
/// so billing takes at most one charge for it. A repriced booking gets a
/// fresh key.
pub fn payment_key(booking_id: BookingId, amount: Money) -> Uuid {
    let name = format!("{booking_id}:{}", amount.amount().normalize());
    Uuid::new_v5(&PAYMENT_KEY_NAMESPACE, name.as_bytes())
}

impl PaymentRequest {
    /// Builds a charge keyed by [`payment_key`].
    pub fn new(user_id: UserId, booking_id: BookingId, amount: Money, card: CardDetails) -> Self {
        Self {
            user_id,
            booking_id,
            amount,
            card,
            idempotency_key: payment_key(booking_id, amount),
        }
    }
}

/// Billing's answer to a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: Option<String>,
    pub amount: Money,
    pub payment_success: bool,
    pub message: String,
}

impl PaymentReceipt {
    /// Builds a receipt for a refused charge.
    pub fn declined(amount: Money, message: impl Into<String>) -> Self {
        Self {
            payment_id: None,
            amount,
            payment_success: false,
            message: message.into(),
        }
    }
}
