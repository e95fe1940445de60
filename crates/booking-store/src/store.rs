use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BookingId, Money, ScheduleId, UserId};

use crate::{BookedSlot, BookingRecord, NewBooking, Result, ScheduleRecord};

/// Data access for schedules and bookings.
///
/// Reads on the store itself see committed state only. Every mutation goes
/// through a [`StoreTransaction`] obtained from [`BookingStore::begin`], so a
/// booking row and the reservation flag of its slot always change together.
///
/// Callers must not issue store reads while holding an open transaction on
/// the same task; implementations are free to serialize the two.
#[async_trait]
pub trait BookingStore: Send + Sync + Clone + 'static {
    /// Transaction handle produced by [`begin`](Self::begin).
    type Tx: StoreTransaction;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Fetches a schedule slot with its vehicle.
    async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<ScheduleRecord>>;

    /// Fetches a booking row.
    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<BookingRecord>>;

    /// Lists unreserved slots on the given date, ordered by start time.
    async fn list_available_schedules(&self, date: NaiveDate) -> Result<Vec<ScheduleRecord>>;

    /// Lists unreserved slots at exactly `hourly_rate`, dated `from_date` or
    /// later, ordered by date and start time.
    async fn list_available_by_rate(
        &self,
        hourly_rate: Money,
        from_date: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>>;

    /// Lists a user's bookings whose status is one of `statuses`, joined with
    /// their slots and ordered by slot date and start time.
    async fn list_user_bookings(&self, user_id: UserId, statuses: &[&str])
    -> Result<Vec<BookedSlot>>;
}

/// A unit of work against the store.
///
/// Rows returned by the `lock_*` methods stay locked until the transaction
/// ends. Dropping a transaction without calling [`commit`](Self::commit)
/// discards every change made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Fetches and locks a schedule slot.
    async fn lock_schedule(&mut self, schedule_id: ScheduleId) -> Result<Option<ScheduleRecord>>;

    /// Fetches and locks a booking row.
    async fn lock_booking(&mut self, booking_id: BookingId) -> Result<Option<BookingRecord>>;

    /// Counts a user's bookings whose status is one of `statuses`.
    ///
    /// Concurrent transactions counting for the same user are serialized
    /// until this one ends.
    async fn count_user_bookings(&mut self, user_id: UserId, statuses: &[&str]) -> Result<u64>;

    /// Inserts a booking and returns the stored row.
    async fn insert_booking(&mut self, booking: NewBooking) -> Result<BookingRecord>;

    /// Overwrites a booking row.
    async fn update_booking(&mut self, booking: &BookingRecord) -> Result<()>;

    /// Sets the reservation flag of a slot.
    async fn set_schedule_reserved(&mut self, schedule_id: ScheduleId, reserved: bool)
    -> Result<()>;

    /// Makes every change visible atomically.
    async fn commit(self) -> Result<()>;
}
