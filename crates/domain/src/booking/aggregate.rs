//! Booking aggregate implementation.

use booking_store::BookingRecord;
use chrono::{DateTime, Utc};
use common::{BookingId, Money, ScheduleId, UserId};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;
use crate::pricing::Quote;

use super::{
    BookingError, BookingEvent, BookingStatus, DriverProfile, LeadTimePolicy, Membership,
    ScheduleSlot,
};

/// Booking aggregate root.
///
/// Holds the priced state of one booking. Command methods check guards and
/// return the event to apply; they never mutate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    booking_id: BookingId,
    schedule_id: ScheduleId,
    user_id: UserId,
    status: BookingStatus,
    base_cost: Money,
    promo_code: Option<String>,
    membership_discount: Money,
    promotion_discount: Money,
    total_discount: Money,
    total_amount: Money,
    confirmation_key: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A booking together with the slot it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub slot: ScheduleSlot,
}

impl TryFrom<BookingRecord> for Booking {
    type Error = DomainError;

    fn try_from(r: BookingRecord) -> Result<Self, Self::Error> {
        let status = r
            .status
            .parse::<BookingStatus>()
            .map_err(|e| DomainError::CorruptRecord {
                booking_id: r.booking_id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            booking_id: r.booking_id,
            schedule_id: r.schedule_id,
            user_id: r.user_id,
            status,
            base_cost: r.base_cost,
            promo_code: r.promo_code,
            membership_discount: r.membership_discount,
            promotion_discount: r.promotion_discount,
            total_discount: r.discount_applied,
            total_amount: r.total_amount,
            confirmation_key: r.confirmation_key,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

// Query methods
impl Booking {
    pub fn booking_id(&self) -> BookingId {
        self.booking_id
    }

    pub fn schedule_id(&self) -> ScheduleId {
        self.schedule_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn base_cost(&self) -> Money {
        self.base_cost
    }

    pub fn promo_code(&self) -> Option<&str> {
        self.promo_code.as_deref()
    }

    pub fn membership_discount(&self) -> Money {
        self.membership_discount
    }

    pub fn promotion_discount(&self) -> Money {
        self.promotion_discount
    }

    pub fn total_discount(&self) -> Money {
        self.total_discount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn confirmation_key(&self) -> Option<Uuid> {
        self.confirmation_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if `user_id` owns this booking.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Converts back into a store row.
    pub fn to_record(&self) -> BookingRecord {
        BookingRecord {
            booking_id: self.booking_id,
            schedule_id: self.schedule_id,
            user_id: self.user_id,
            status: self.status.as_str().to_string(),
            base_cost: self.base_cost,
            promo_code: self.promo_code.clone(),
            membership_discount: self.membership_discount,
            promotion_discount: self.promotion_discount,
            discount_applied: self.total_discount,
            total_amount: self.total_amount,
            confirmation_key: self.confirmation_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Command methods (return events)
impl Booking {
    /// Checks whether a driver may open a session on a slot.
    ///
    /// Guards run in order: licence valid on the slot date, slot not
    /// reserved, active bookings below the membership limit.
    pub fn admit(
        driver: &DriverProfile,
        membership: &Membership,
        slot: &ScheduleSlot,
        active_bookings: u64,
    ) -> Result<(), BookingError> {
        if !driver.license_valid_on(slot.date) {
            return Err(BookingError::LicenseExpired {
                expiry: driver.license_expiry,
                date: slot.date,
            });
        }
        if slot.is_reserved {
            return Err(BookingError::AlreadyReserved(slot.schedule_id));
        }
        if active_bookings >= u64::from(membership.booking_limit) {
            return Err(BookingError::BookingLimitReached {
                limit: membership.booking_limit,
            });
        }
        Ok(())
    }

    /// Checks that a promotion may be applied before repricing.
    pub fn ensure_pending_session(&self) -> Result<(), BookingError> {
        if !self.status.can_apply_promotion() {
            return Err(BookingError::BookingNotPending {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Replaces the price breakdown with a promotion quote.
    pub fn apply_promotion(
        &self,
        quote: Quote,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        self.ensure_pending_session()?;
        Ok(BookingEvent::PromotionApplied { quote, at: now })
    }

    /// Confirms the booking after a payment callback.
    ///
    /// Returns `Ok(None)` when the same confirmation was already applied.
    pub fn confirm(
        &self,
        payment_success: bool,
        confirmation_key: Option<Uuid>,
        charged: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<Option<BookingEvent>, BookingError> {
        if !payment_success {
            return Err(BookingError::PaymentNotSuccessful);
        }
        if self.status == BookingStatus::Confirmed
            && confirmation_key.is_some()
            && self.confirmation_key == confirmation_key
        {
            return Ok(None);
        }
        if !self.status.can_confirm() {
            return Err(BookingError::NotPending {
                status: self.status,
            });
        }
        if let Some(charged) = charged.filter(|c| *c != self.total_amount) {
            return Err(BookingError::AmountMismatch {
                charged,
                expected: self.total_amount,
            });
        }
        Ok(Some(BookingEvent::Confirmed {
            confirmation_key,
            at: now,
        }))
    }

    /// Abandons a pending session.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<BookingEvent, BookingError> {
        if !self.status.can_expire() {
            return Err(BookingError::BookingNotPending {
                status: self.status,
            });
        }
        Ok(BookingEvent::SessionExpired { at: now })
    }

    /// Cancels a confirmed booking with enough notice.
    pub fn cancel(
        &self,
        slot: &ScheduleSlot,
        policy: &LeadTimePolicy,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        if !self.status.can_cancel() {
            return Err(BookingError::NotConfirmed {
                status: self.status,
            });
        }
        policy.ensure_cancellable(slot, now)?;
        Ok(BookingEvent::Cancelled { at: now })
    }

    /// Moves a confirmed booking from `current` to `target`.
    ///
    /// Guards run in order: booking confirmed, original slot outside the lead
    /// window, target exists, target unreserved, same hourly rate, same
    /// duration.
    pub fn reschedule(
        &self,
        current: &ScheduleSlot,
        target: Option<&ScheduleSlot>,
        target_id: ScheduleId,
        policy: &LeadTimePolicy,
        now: DateTime<Utc>,
    ) -> Result<BookingEvent, BookingError> {
        if !self.status.can_reschedule() {
            return Err(BookingError::NotConfirmed {
                status: self.status,
            });
        }
        policy.ensure_outside_window(current, now)?;

        let target = target.ok_or(BookingError::ScheduleNotFound(target_id))?;
        if target.is_reserved {
            return Err(BookingError::AlreadyReserved(target.schedule_id));
        }
        if target.hourly_rate != current.hourly_rate {
            return Err(BookingError::DifferentVehicleClass {
                expected: current.hourly_rate,
                found: target.hourly_rate,
            });
        }
        if target.duration() != current.duration() {
            return Err(BookingError::duration_mismatch(
                current.duration(),
                target.duration(),
            ));
        }

        Ok(BookingEvent::Rescheduled {
            from: current.schedule_id,
            to: target.schedule_id,
            at: now,
        })
    }

    /// Marks a confirmed booking as taken place.
    pub fn complete(&self, now: DateTime<Utc>) -> Result<BookingEvent, BookingError> {
        if !self.status.can_complete() {
            return Err(BookingError::NotConfirmed {
                status: self.status,
            });
        }
        Ok(BookingEvent::Completed { at: now })
    }

    /// Applies an event to the booking state.
    pub fn apply(&mut self, event: BookingEvent) {
        self.updated_at = event.at();
        match event {
            BookingEvent::SessionCreated { .. } => {
                // Sessions are created from the inserted row
            }
            BookingEvent::PromotionApplied { quote, .. } => self.apply_quote(quote),
            BookingEvent::Confirmed {
                confirmation_key, ..
            } => {
                self.status = BookingStatus::Confirmed;
                self.confirmation_key = confirmation_key;
            }
            BookingEvent::SessionExpired { .. } => {
                self.status = BookingStatus::SessionExpired;
            }
            BookingEvent::Cancelled { .. } => {
                self.status = BookingStatus::Cancelled;
            }
            BookingEvent::Rescheduled { to, .. } => {
                self.schedule_id = to;
            }
            BookingEvent::Completed { .. } => {
                self.status = BookingStatus::Completed;
            }
        }
    }

    fn apply_quote(&mut self, quote: Quote) {
        self.base_cost = quote.base_cost;
        self.membership_discount = quote.membership_discount;
        self.promotion_discount = quote.promotion_discount;
        self.total_discount = quote.total_discount;
        self.total_amount = quote.total_amount;
        self.promo_code = quote.promo_code;
    }
}
