//! Booking service running each transition inside one store transaction.

use booking_store::{
    BookedSlot, BookingRecord, BookingStore, NewBooking, StoreError, StoreTransaction,
};
use chrono::{DateTime, NaiveDate, Utc};
use common::{BookingId, Money, ScheduleId, UserId};
use uuid::Uuid;

use crate::error::DomainError;
use crate::pricing::compute_amount;

use super::{
    Booking, BookingDetails, BookingError, BookingEvent, BookingStatus, DriverProfile,
    LeadTimePolicy, Membership, Promotion, ScheduleSlot, SlotOffer,
};

/// Statuses counted against the membership booking limit.
const LIMITED_STATUSES: [&str; 2] = ["Confirmed", "Completed"];

fn find_owned(
    record: Option<BookingRecord>,
    booking_id: BookingId,
    user_id: UserId,
) -> Result<Booking, DomainError> {
    let booking = record
        .map(Booking::try_from)
        .transpose()?
        .filter(|b| b.is_owned_by(user_id))
        .ok_or(BookingError::BookingNotFound(booking_id))?;
    Ok(booking)
}

fn details_from(row: BookedSlot) -> Result<BookingDetails, DomainError> {
    Ok(BookingDetails {
        booking: Booking::try_from(row.booking)?,
        slot: row.schedule.into(),
    })
}

fn missing_slot(schedule_id: ScheduleId) -> DomainError {
    DomainError::Store(StoreError::RowNotFound {
        table: "schedules",
        id: schedule_id.as_i64(),
    })
}

async fn lock_slot<T: StoreTransaction>(
    tx: &mut T,
    schedule_id: ScheduleId,
) -> Result<ScheduleSlot, DomainError> {
    tx.lock_schedule(schedule_id)
        .await?
        .map(ScheduleSlot::from)
        .ok_or_else(|| missing_slot(schedule_id))
}

fn record_transition(transition: &'static str, booking: &Booking) {
    metrics::counter!("booking_transitions_total", "transition" => transition).increment(1);
    tracing::info!(
        transition,
        booking_id = %booking.booking_id(),
        status = %booking.status(),
        "booking transition applied"
    );
}

fn record_failure(transition: &'static str, error: &DomainError) {
    if error.is_rejection() {
        metrics::counter!("booking_transition_rejections_total", "transition" => transition)
            .increment(1);
        tracing::warn!(transition, %error, "booking transition rejected");
    } else {
        tracing::error!(transition, %error, "booking transition failed");
    }
}

/// Service for managing bookings.
///
/// Every write runs as one store transaction: the booking row and the
/// reservation flags it affects change together or not at all. The caller
/// supplies `now`, and collaborator data is passed in rather than fetched.
pub struct BookingService<S: BookingStore> {
    store: S,
    policy: LeadTimePolicy,
}

impl<S: BookingStore> BookingService<S> {
    /// Creates a new booking service over the given store.
    pub fn new(store: S, policy: LeadTimePolicy) -> Self {
        Self { store, policy }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the lead-time policy.
    pub fn policy(&self) -> &LeadTimePolicy {
        &self.policy
    }

    /// Returns the date at `now` in the reference timezone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.policy.today(now)
    }

    /// Opens a pending session on a slot and reserves it.
    #[tracing::instrument(skip(self, driver, membership), fields(user_id = %driver.user_id))]
    pub async fn create_session(
        &self,
        driver: &DriverProfile,
        membership: &Membership,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_create_session(driver, membership, schedule_id, now)
            .await
            .inspect_err(|e| record_failure("session_created", e))
    }

    async fn try_create_session(
        &self,
        driver: &DriverProfile,
        membership: &Membership,
        schedule_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        let mut tx = self.store.begin().await?;

        let mut slot = tx
            .lock_schedule(schedule_id)
            .await?
            .map(ScheduleSlot::from)
            .ok_or(BookingError::ScheduleNotFound(schedule_id))?;
        let active = tx
            .count_user_bookings(driver.user_id, &LIMITED_STATUSES)
            .await?;
        Booking::admit(driver, membership, &slot, active)?;

        let quote = compute_amount(
            &slot.pricing_input(membership.hourly_rate_discount_pct),
            None,
            self.policy.today(now),
        )?;
        let record = tx
            .insert_booking(NewBooking {
                schedule_id,
                user_id: driver.user_id,
                status: BookingStatus::Pending.as_str().to_string(),
                base_cost: quote.base_cost,
                promo_code: None,
                membership_discount: quote.membership_discount,
                promotion_discount: quote.promotion_discount,
                discount_applied: quote.total_discount,
                total_amount: quote.total_amount,
                created_at: now,
            })
            .await?;
        tx.set_schedule_reserved(schedule_id, true).await?;
        tx.commit().await?;

        let event = BookingEvent::SessionCreated {
            user_id: driver.user_id,
            schedule_id,
            quote,
            at: now,
        };
        let booking = Booking::try_from(record)?;
        slot.is_reserved = true;
        record_transition(event.name(), &booking);
        Ok(BookingDetails { booking, slot })
    }

    /// Reprices a pending session with a promotion.
    ///
    /// Pricing is recomputed from the slot, so applying the same code twice
    /// yields the same amounts.
    #[tracing::instrument(skip(self, membership, promotion), fields(code = %promotion.code))]
    pub async fn apply_promotion(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        membership: &Membership,
        promotion: &Promotion,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_apply_promotion(user_id, booking_id, membership, promotion, now)
            .await
            .inspect_err(|e| record_failure("promotion_applied", e))
    }

    async fn try_apply_promotion(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        membership: &Membership,
        promotion: &Promotion,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut booking = find_owned(tx.lock_booking(booking_id).await?, booking_id, user_id)?;
        booking.ensure_pending_session()?;

        let slot = lock_slot(&mut tx, booking.schedule_id()).await?;
        let quote = compute_amount(
            &slot.pricing_input(membership.hourly_rate_discount_pct),
            Some(promotion),
            self.policy.today(now),
        )?;
        let event = booking.apply_promotion(quote, now)?;
        let transition = event.name();
        booking.apply(event);

        tx.update_booking(&booking.to_record()).await?;
        tx.commit().await?;

        record_transition(transition, &booking);
        Ok(BookingDetails { booking, slot })
    }

    /// Confirms a pending booking after a payment callback.
    ///
    /// A replay carrying the confirmation key already stored returns the
    /// booking unchanged. When `charged` is given it must equal the booking
    /// total as read inside the transaction.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        payment_success: bool,
        confirmation_key: Option<Uuid>,
        charged: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_confirm(user_id, booking_id, payment_success, confirmation_key, charged, now)
            .await
            .inspect_err(|e| record_failure("confirmed", e))
    }

    async fn try_confirm(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        payment_success: bool,
        confirmation_key: Option<Uuid>,
        charged: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut booking = find_owned(tx.lock_booking(booking_id).await?, booking_id, user_id)?;
        let slot = lock_slot(&mut tx, booking.schedule_id()).await?;

        let Some(event) = booking.confirm(payment_success, confirmation_key, charged, now)? else {
            tracing::info!(%booking_id, "confirmation already applied");
            return Ok(BookingDetails { booking, slot });
        };
        let transition = event.name();
        booking.apply(event);

        tx.update_booking(&booking.to_record()).await?;
        tx.commit().await?;

        record_transition(transition, &booking);
        Ok(BookingDetails { booking, slot })
    }

    /// Expires a pending session and releases its slot.
    #[tracing::instrument(skip(self))]
    pub async fn expire_session(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_release(user_id, booking_id, now, |booking, _, _, now| {
            booking.expire(now)
        })
        .await
        .inspect_err(|e| record_failure("session_expired", e))
    }

    /// Cancels a confirmed booking and releases its slot.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_release(user_id, booking_id, now, |booking, slot, policy, now| {
            booking.cancel(slot, policy, now)
        })
        .await
        .inspect_err(|e| record_failure("cancelled", e))
    }

    /// Runs a transition that ends the booking's hold on its slot.
    async fn try_release<F>(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        now: DateTime<Utc>,
        transition: F,
    ) -> Result<BookingDetails, DomainError>
    where
        F: FnOnce(
                &Booking,
                &ScheduleSlot,
                &LeadTimePolicy,
                DateTime<Utc>,
            ) -> Result<BookingEvent, BookingError>
            + Send,
    {
        let mut tx = self.store.begin().await?;
        let mut booking = find_owned(tx.lock_booking(booking_id).await?, booking_id, user_id)?;
        let mut slot = lock_slot(&mut tx, booking.schedule_id()).await?;

        let event = transition(&booking, &slot, &self.policy, now)?;
        let name = event.name();
        booking.apply(event);

        tx.update_booking(&booking.to_record()).await?;
        tx.set_schedule_reserved(slot.schedule_id, false).await?;
        tx.commit().await?;

        slot.is_reserved = false;
        record_transition(name, &booking);
        Ok(BookingDetails { booking, slot })
    }

    /// Moves a confirmed booking to another slot of the same class and length.
    ///
    /// Reserving the target, releasing the original slot and repointing the
    /// booking happen in one transaction.
    #[tracing::instrument(skip(self))]
    pub async fn reschedule(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        target_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_reschedule(user_id, booking_id, target_id, now)
            .await
            .inspect_err(|e| record_failure("rescheduled", e))
    }

    async fn try_reschedule(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        target_id: ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut booking = find_owned(tx.lock_booking(booking_id).await?, booking_id, user_id)?;
        let current_id = booking.schedule_id();

        // Slots are locked in id order so crossing reschedules cannot deadlock.
        let (current, target) = if target_id < current_id {
            let target = tx.lock_schedule(target_id).await?;
            (lock_slot(&mut tx, current_id).await?, target)
        } else {
            let current = lock_slot(&mut tx, current_id).await?;
            (current, tx.lock_schedule(target_id).await?)
        };
        let target = target.map(ScheduleSlot::from);

        let event =
            booking.reschedule(&current, target.as_ref(), target_id, &self.policy, now)?;
        let name = event.name();
        booking.apply(event);

        tx.update_booking(&booking.to_record()).await?;
        tx.set_schedule_reserved(target_id, true).await?;
        tx.set_schedule_reserved(current_id, false).await?;
        tx.commit().await?;

        let mut slot = target.ok_or_else(|| missing_slot(target_id))?;
        slot.is_reserved = true;
        record_transition(name, &booking);
        Ok(BookingDetails { booking, slot })
    }

    /// Marks a confirmed booking as completed. The slot stays reserved.
    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        self.try_complete(user_id, booking_id, now)
            .await
            .inspect_err(|e| record_failure("completed", e))
    }

    async fn try_complete(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<BookingDetails, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut booking = find_owned(tx.lock_booking(booking_id).await?, booking_id, user_id)?;
        let slot = lock_slot(&mut tx, booking.schedule_id()).await?;

        let event = booking.complete(now)?;
        let name = event.name();
        booking.apply(event);

        tx.update_booking(&booking.to_record()).await?;
        tx.commit().await?;

        record_transition(name, &booking);
        Ok(BookingDetails { booking, slot })
    }

    // -- Reads --

    /// Fetches a booking owned by `user_id` with its current slot.
    #[tracing::instrument(skip(self))]
    pub async fn get_booking(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails, DomainError> {
        let booking = find_owned(self.store.get_booking(booking_id).await?, booking_id, user_id)?;
        let slot = self
            .store
            .get_schedule(booking.schedule_id())
            .await?
            .map(ScheduleSlot::from)
            .ok_or_else(|| missing_slot(booking.schedule_id()))?;
        Ok(BookingDetails { booking, slot })
    }

    /// Fetches a booking that must still be a pending session.
    #[tracing::instrument(skip(self))]
    pub async fn verify_session(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<BookingDetails, DomainError> {
        let details = self.get_booking(user_id, booking_id).await?;
        details.booking.ensure_pending_session()?;
        Ok(details)
    }

    /// Lists confirmed bookings from today onwards, soonest first.
    #[tracing::instrument(skip(self))]
    pub async fn upcoming_rentals(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BookingDetails>, DomainError> {
        let today = self.policy.today(now);
        let rows = self
            .store
            .list_user_bookings(user_id, &[BookingStatus::Confirmed.as_str()])
            .await?;

        rows.into_iter()
            .filter(|row| row.schedule.date >= today)
            .map(details_from)
            .collect()
    }

    /// Lists completed bookings, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn rental_history(&self, user_id: UserId) -> Result<Vec<BookingDetails>, DomainError> {
        let rows = self
            .store
            .list_user_bookings(user_id, &[BookingStatus::Completed.as_str()])
            .await?;

        rows.into_iter()
            .rev()
            .map(details_from)
            .collect()
    }

    /// Lists unreserved slots on a date.
    #[tracing::instrument(skip(self))]
    pub async fn available_slots(&self, date: NaiveDate) -> Result<Vec<SlotOffer>, DomainError> {
        let slots = self.store.list_available_schedules(date).await?;
        Ok(slots
            .into_iter()
            .map(|s| SlotOffer::from(ScheduleSlot::from(s)))
            .collect())
    }

    /// Fetches one slot with its undiscounted cost.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_details(&self, schedule_id: ScheduleId) -> Result<SlotOffer, DomainError> {
        let slot = self
            .store
            .get_schedule(schedule_id)
            .await?
            .map(ScheduleSlot::from)
            .ok_or(BookingError::ScheduleNotFound(schedule_id))?;
        Ok(SlotOffer::from(slot))
    }

    /// Lists slots a confirmed booking could move to: unreserved, same hourly
    /// rate and duration, dated today or later.
    #[tracing::instrument(skip(self))]
    pub async fn reschedule_options(
        &self,
        user_id: UserId,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlotOffer>, DomainError> {
        let details = self.get_booking(user_id, booking_id).await?;
        if !details.booking.status().can_reschedule() {
            return Err(BookingError::NotConfirmed {
                status: details.booking.status(),
            }
            .into());
        }

        let current = &details.slot;
        let candidates = self
            .store
            .list_available_by_rate(current.hourly_rate, self.policy.today(now))
            .await?;

        Ok(candidates
            .into_iter()
            .map(ScheduleSlot::from)
            .filter(|s| s.schedule_id != current.schedule_id && s.duration() == current.duration())
            .map(SlotOffer::from)
            .collect())
    }
}
