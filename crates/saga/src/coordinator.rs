//! Saga coordinator for the booking-session flow.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use booking_store::BookingStore;
use chrono::{DateTime, NaiveDate, Utc};
use common::{BookingId, Money, ScheduleId, UserId};
use domain::{
    BookingDetails, BookingService, Clock, DomainError, DriverProfile, Membership, PricingError,
    Promotion, Quote, SlotOffer, compute_amount,
};
use uuid::Uuid;

use crate::error::{Result, SagaError};
use crate::services::{
    BillingGateway, CardDetails, CollaboratorError, MembershipCatalog, PaymentReceipt,
    PaymentRequest, PromotionCatalog, UserDirectory,
};
use crate::steps;

/// The external services the saga calls.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub memberships: Arc<dyn MembershipCatalog>,
    pub promotions: Arc<dyn PromotionCatalog>,
    pub billing: Arc<dyn BillingGateway>,
}

/// A payment callback from billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Confirmation {
    pub payment_success: bool,
    /// Key identifying the charge; a replay with the same key is a no-op.
    pub idempotency_key: Option<Uuid>,
    /// Amount billing debited. Must match the booking total when given.
    pub amount: Option<Money>,
}

/// A confirmed booking together with billing's receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub details: BookingDetails,
    pub receipt: PaymentReceipt,
}

/// Records how long a flow took when dropped, whatever the outcome.
struct FlowTimer {
    flow: &'static str,
    started: Instant,
}

impl FlowTimer {
    fn start(flow: &'static str) -> Self {
        Self {
            flow,
            started: Instant::now(),
        }
    }
}

impl Drop for FlowTimer {
    fn drop(&mut self) {
        metrics::histogram!("booking_saga_duration_seconds", "flow" => self.flow)
            .record(self.started.elapsed().as_secs_f64());
    }
}

fn step(name: &'static str) {
    metrics::counter!("booking_saga_steps_total", "step" => name).increment(1);
    tracing::info!(step = name, "saga step started");
}

fn observe<T>(service: &'static str, result: &std::result::Result<T, CollaboratorError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(CollaboratorError::NotFound) => "not_found",
        Err(CollaboratorError::Unavailable(_)) => "unavailable",
        Err(CollaboratorError::Invalid(_)) => "invalid",
    };
    metrics::counter!("collaborator_requests_total", "service" => service, "outcome" => outcome)
        .increment(1);
    if let Err(e) = result
        && !matches!(e, CollaboratorError::NotFound)
    {
        tracing::warn!(service, error = %e, "collaborator call failed");
    }
}

/// Bookings with a payment underway in this process.
#[derive(Default)]
struct PaymentsInFlight(Mutex<HashSet<BookingId>>);

impl PaymentsInFlight {
    /// Returns `None` when the booking is already being paid for.
    fn claim(&self, booking_id: BookingId) -> Option<InFlightPayment<'_>> {
        let mut bookings = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        bookings.insert(booking_id).then_some(InFlightPayment {
            registry: self,
            booking_id,
        })
    }
}

/// Releases the booking when dropped.
struct InFlightPayment<'a> {
    registry: &'a PaymentsInFlight,
    booking_id: BookingId,
}

impl Drop for InFlightPayment<'_> {
    fn drop(&mut self) {
        self.registry
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.booking_id);
    }
}

/// Orchestrates the booking flow across the user, promotion and billing
/// services and the local booking store.
///
/// Collaborator data is fetched on every call and never cached. No
/// collaborator is called while a store transaction is open: the saga
/// gathers what it needs first and then hands it to [`BookingService`].
pub struct BookingSaga<S: BookingStore> {
    bookings: BookingService<S>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    payments: PaymentsInFlight,
}

impl<S: BookingStore> BookingSaga<S> {
    /// Creates a new saga coordinator.
    pub fn new(
        bookings: BookingService<S>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            collaborators,
            clock,
            payments: PaymentsInFlight::default(),
        }
    }

    /// Returns the booking service the saga drives.
    pub fn bookings(&self) -> &BookingService<S> {
        &self.bookings
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Validates the user and opens a pending session on a slot.
    #[tracing::instrument(skip(self))]
    pub async fn start_session(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("start_session");
        let driver = self.driver(user_id).await?;
        let membership = self.membership(&driver).await?;

        step(steps::RESERVE_SLOT);
        let details = self
            .bookings
            .create_session(&driver, &membership, schedule_id, self.now())
            .await?;
        tracing::info!(booking_id = %details.booking.booking_id(), "booking session started");
        Ok(details)
    }

    /// Reprices a pending session with a promotion code.
    #[tracing::instrument(skip(self))]
    pub async fn apply_promotion(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        code: &str,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("apply_promotion");
        let driver = self.driver(user_id).await?;
        let membership = self.membership(&driver).await?;
        let promotion = self.promotion(code).await?;

        step(steps::APPLY_PROMOTION);
        let details = self
            .bookings
            .apply_promotion(user_id, booking_id, &membership, &promotion, self.now())
            .await?;
        Ok(details)
    }

    /// Charges the session's invoice total and confirms the booking.
    ///
    /// The charge is keyed by booking and total, so concurrent or repeated
    /// attempts at the same total are debited once. A declined or failed
    /// charge leaves the session pending; it can be retried or released with
    /// [`cancel_session`](Self::cancel_session). A charge whose confirmation
    /// fails is refunded.
    #[tracing::instrument(skip(self, card))]
    pub async fn request_payment(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        card: CardDetails,
    ) -> Result<PaymentOutcome> {
        let _timer = FlowTimer::start("request_payment");
        self.driver(user_id).await?;
        let _in_flight = self
            .payments
            .claim(booking_id)
            .ok_or(SagaError::PaymentInProgress(booking_id))?;
        let session = self.bookings.verify_session(user_id, booking_id).await?;

        step(steps::REQUEST_PAYMENT);
        let request =
            PaymentRequest::new(user_id, booking_id, session.booking.total_amount(), card);
        let result = self.collaborators.billing.submit_payment(&request).await;
        observe("billing", &result);
        let receipt = result.map_err(|e| SagaError::collaborator("billing", e))?;
        if !receipt.payment_success {
            tracing::warn!(%booking_id, reason = %receipt.message, "payment declined");
            return Err(SagaError::PaymentDeclined(receipt.message));
        }

        step(steps::CONFIRM_BOOKING);
        let confirmed = self
            .bookings
            .confirm(
                user_id,
                booking_id,
                true,
                Some(request.idempotency_key),
                Some(request.amount),
                self.now(),
            )
            .await;
        match confirmed {
            Ok(details) => Ok(PaymentOutcome { details, receipt }),
            Err(e) => {
                if let Ok(details) = self.bookings.get_booking(user_id, booking_id).await
                    && details.booking.confirmation_key() == Some(request.idempotency_key)
                {
                    return Ok(PaymentOutcome { details, receipt });
                }
                tracing::warn!(%booking_id, error = %e, "confirmation failed after payment");
                self.refund(&request).await;
                Err(e.into())
            }
        }
    }

    /// Compensates a charge whose booking could not be confirmed.
    async fn refund(&self, request: &PaymentRequest) {
        step(steps::REFUND_PAYMENT);
        let result = self
            .collaborators
            .billing
            .refund(request.idempotency_key)
            .await;
        observe("billing", &result);
        match result {
            Ok(()) => tracing::info!(booking_id = %request.booking_id, "payment refunded"),
            Err(e) => {
                metrics::counter!("booking_saga_compensation_failures_total").increment(1);
                tracing::error!(
                    booking_id = %request.booking_id,
                    idempotency_key = %request.idempotency_key,
                    error = %e,
                    "refund failed; charge left in place"
                );
            }
        }
    }

    /// Applies billing's payment callback.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_booking(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        confirmation: Confirmation,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("confirm_booking");
        self.driver(user_id).await?;

        step(steps::CONFIRM_BOOKING);
        let details = self
            .bookings
            .confirm(
                user_id,
                booking_id,
                confirmation.payment_success,
                confirmation.idempotency_key,
                confirmation.amount,
                self.now(),
            )
            .await?;
        Ok(details)
    }

    /// Abandons a pending session, releasing its slot.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_session(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("cancel_session");
        self.driver(user_id).await?;

        step(steps::EXPIRE_SESSION);
        let details = self
            .bookings
            .expire_session(user_id, booking_id, self.now())
            .await?;
        Ok(details)
    }

    /// Cancels a confirmed booking at least the minimum notice ahead.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("cancel_booking");
        self.driver(user_id).await?;
        Ok(self.bookings.cancel(user_id, booking_id, self.now()).await?)
    }

    /// Moves a confirmed booking to another slot of the same class and length.
    #[tracing::instrument(skip(self))]
    pub async fn reschedule(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        target: ScheduleId,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("reschedule");
        self.driver(user_id).await?;
        Ok(self
            .bookings
            .reschedule(user_id, booking_id, target, self.now())
            .await?)
    }

    /// Marks a confirmed rental as completed.
    #[tracing::instrument(skip(self))]
    pub async fn complete_booking(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails> {
        let _timer = FlowTimer::start("complete_booking");
        self.driver(user_id).await?;
        Ok(self.bookings.complete(user_id, booking_id, self.now()).await?)
    }

    /// Returns a booking that must still be a pending session.
    pub async fn verify_session(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails> {
        self.driver(user_id).await?;
        Ok(self.bookings.verify_session(user_id, booking_id).await?)
    }

    /// Returns one of the user's bookings.
    pub async fn get_booking(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails> {
        self.driver(user_id).await?;
        Ok(self.bookings.get_booking(user_id, booking_id).await?)
    }

    /// Lists the user's confirmed bookings from today onwards.
    pub async fn upcoming_rentals(&self, user_id: UserId) -> Result<Vec<BookingDetails>> {
        self.driver(user_id).await?;
        Ok(self.bookings.upcoming_rentals(user_id, self.now()).await?)
    }

    /// Lists the user's completed bookings, most recent first.
    pub async fn rental_history(&self, user_id: UserId) -> Result<Vec<BookingDetails>> {
        self.driver(user_id).await?;
        Ok(self.bookings.rental_history(user_id).await?)
    }

    /// Lists slots a confirmed booking could be moved to.
    pub async fn reschedule_options(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<Vec<SlotOffer>> {
        self.driver(user_id).await?;
        Ok(self
            .bookings
            .reschedule_options(user_id, booking_id, self.now())
            .await?)
    }

    /// Lists unreserved slots on a date.
    pub async fn available_slots(&self, date: NaiveDate) -> Result<Vec<SlotOffer>> {
        Ok(self.bookings.available_slots(date).await?)
    }

    /// Returns a slot with its undiscounted cost.
    pub async fn schedule_details(&self, schedule_id: ScheduleId) -> Result<SlotOffer> {
        Ok(self.bookings.schedule_details(schedule_id).await?)
    }

    /// Prices a slot for a driver without reserving it.
    ///
    /// Promotion validity is evaluated today, so the same request can
    /// price differently once the promotion lapses.
    #[tracing::instrument(skip(self))]
    pub async fn quote(
        &self,
        user_id: UserId,
        schedule_id: ScheduleId,
        promo_code: Option<&str>,
    ) -> Result<Quote> {
        let driver = self.driver(user_id).await?;
        let membership = self.membership(&driver).await?;
        let offer = self.bookings.schedule_details(schedule_id).await?;
        let promotion = match promo_code {
            Some(code) => Some(self.promotion(code).await?),
            None => None,
        };

        let input = offer.slot.pricing_input(membership.hourly_rate_discount_pct);
        let today = self.bookings.today(self.now());
        let quote = compute_amount(&input, promotion.as_ref(), today).map_err(DomainError::from)?;
        Ok(quote)
    }

    async fn driver(&self, user_id: UserId) -> Result<DriverProfile> {
        step(steps::VALIDATE_USER);
        let result = self.collaborators.users.get_user(user_id).await;
        observe("user", &result);
        result.map_err(|e| match e {
            CollaboratorError::NotFound => SagaError::UserNotFound(user_id),
            other => SagaError::collaborator("user", other),
        })
    }

    async fn membership(&self, driver: &DriverProfile) -> Result<Membership> {
        step(steps::LOAD_MEMBERSHIP);
        let result = self
            .collaborators
            .memberships
            .get_membership(&driver.membership_id)
            .await;
        observe("membership", &result);
        result.map_err(|e| match e {
            CollaboratorError::NotFound => {
                SagaError::MembershipNotFound(driver.membership_id.clone())
            }
            other => SagaError::collaborator("membership", other),
        })
    }

    async fn promotion(&self, code: &str) -> Result<Promotion> {
        step(steps::LOOKUP_PROMOTION);
        let result = self.collaborators.promotions.get_promotion(code).await;
        observe("promotion", &result);
        result.map_err(|e| match e {
            CollaboratorError::NotFound => DomainError::from(PricingError::PromoNotFound {
                code: code.to_string(),
            })
            .into(),
            other => SagaError::collaborator("promotion", other),
        })
    }
}
