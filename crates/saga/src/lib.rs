//! Booking-session saga across the user, promotion and billing services.
//!
//! The saga drives a reservation from a pending session to a confirmed
//! booking:
//! 1. Validate the driver and load their membership
//! 2. Reserve the slot and price the session
//! 3. Optionally reprice with a promotion code
//! 4. Charge the invoice total through billing, then confirm
//!
//! A charge whose booking cannot be confirmed is refunded. A session
//! abandoned before confirmation is released by expiring it, which frees the
//! slot.

pub mod coordinator;
pub mod error;
pub mod services;
pub mod steps;

pub use coordinator::{BookingSaga, Collaborators, Confirmation, PaymentOutcome};
pub use error::SagaError;
pub use services::{
    BillingGateway, CardDetails, CollaboratorError, HttpBillingGateway, HttpPromotionCatalog,
    HttpUserDirectory, InMemoryBillingGateway, InMemoryPromotionCatalog, InMemoryUserDirectory,
    MembershipCatalog, PaymentReceipt, PaymentRequest, PromotionCatalog, StoredCard,
    UserDirectory, collaborator_client, payment_key,
};
