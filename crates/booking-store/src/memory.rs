use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BookingId, Money, ScheduleId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    BookedSlot, BookingRecord, NewBooking, NewSchedule, NewVehicle, Result, ScheduleRecord,
    StoreError,
    store::{BookingStore, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    vehicles: BTreeMap<i64, NewVehicle>,
    schedules: BTreeMap<ScheduleId, ScheduleRecord>,
    bookings: BTreeMap<BookingId, BookingRecord>,
    next_vehicle_id: i64,
    next_schedule_id: i64,
    next_booking_id: i64,
}

impl Tables {
    fn user_bookings<'a>(
        &'a self,
        user_id: UserId,
        statuses: &'a [&str],
    ) -> impl Iterator<Item = &'a BookingRecord> + 'a {
        self.bookings
            .values()
            .filter(move |b| b.user_id == user_id && statuses.iter().any(|s| b.status == *s))
    }
}

/// In-memory booking store for tests and local runs.
///
/// A single mutex guards all tables. A transaction holds it from `begin`
/// until it is committed or dropped and works on a private copy, so
/// uncommitted changes are never observed and a dropped transaction leaves
/// nothing behind.
#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<Mutex<Tables>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent commit fail until reset.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Registers a vehicle and returns its identifier.
    pub async fn add_vehicle(&self, vehicle: NewVehicle) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        tables.next_vehicle_id += 1;
        let vehicle_id = tables.next_vehicle_id;
        tables.vehicles.insert(vehicle_id, vehicle);
        Ok(vehicle_id)
    }

    /// Opens an unreserved slot for a registered vehicle.
    pub async fn add_schedule(&self, schedule: NewSchedule) -> Result<ScheduleRecord> {
        let mut tables = self.tables.lock().await;
        let vehicle = tables
            .vehicles
            .get(&schedule.vehicle_id)
            .cloned()
            .ok_or(StoreError::RowNotFound {
                table: "vehicles",
                id: schedule.vehicle_id,
            })?;

        tables.next_schedule_id += 1;
        let record = ScheduleRecord {
            schedule_id: ScheduleId::new(tables.next_schedule_id),
            vehicle_id: schedule.vehicle_id,
            vehicle_type: vehicle.vehicle_type,
            brand: vehicle.brand,
            model: vehicle.model,
            license_plate: vehicle.license_plate,
            hourly_rate: vehicle.hourly_rate,
            date: schedule.date,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
            is_reserved: false,
        };
        tables.schedules.insert(record.schedule_id, record.clone());
        Ok(record)
    }

    /// Returns the total number of bookings stored.
    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            fail_on_commit: self.fail_on_commit.clone(),
        })
    }

    async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<ScheduleRecord>> {
        Ok(self.tables.lock().await.schedules.get(&schedule_id).cloned())
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<BookingRecord>> {
        Ok(self.tables.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn list_available_schedules(&self, date: NaiveDate) -> Result<Vec<ScheduleRecord>> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<_> = tables
            .schedules
            .values()
            .filter(|s| !s.is_reserved && s.date == date)
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.schedule_id));
        Ok(slots)
    }

    async fn list_available_by_rate(
        &self,
        hourly_rate: Money,
        from_date: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>> {
        let tables = self.tables.lock().await;
        let mut slots: Vec<_> = tables
            .schedules
            .values()
            .filter(|s| !s.is_reserved && s.hourly_rate == hourly_rate && s.date >= from_date)
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.date, s.start_time, s.schedule_id));
        Ok(slots)
    }

    async fn list_user_bookings(
        &self,
        user_id: UserId,
        statuses: &[&str],
    ) -> Result<Vec<BookedSlot>> {
        let tables = self.tables.lock().await;
        let mut rows = Vec::new();
        for booking in tables.user_bookings(user_id, statuses) {
            let schedule = tables.schedules.get(&booking.schedule_id).cloned().ok_or(
                StoreError::RowNotFound {
                    table: "schedules",
                    id: booking.schedule_id.as_i64(),
                },
            )?;
            rows.push(BookedSlot {
                booking: booking.clone(),
                schedule,
            });
        }
        rows.sort_by_key(|r| {
            (
                r.schedule.date,
                r.schedule.start_time,
                r.booking.booking_id,
            )
        });
        Ok(rows)
    }
}

/// Transaction over an [`InMemoryBookingStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_on_commit: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_schedule(&mut self, schedule_id: ScheduleId) -> Result<Option<ScheduleRecord>> {
        Ok(self.working.schedules.get(&schedule_id).cloned())
    }

    async fn lock_booking(&mut self, booking_id: BookingId) -> Result<Option<BookingRecord>> {
        Ok(self.working.bookings.get(&booking_id).cloned())
    }

    async fn count_user_bookings(&mut self, user_id: UserId, statuses: &[&str]) -> Result<u64> {
        Ok(self.working.user_bookings(user_id, statuses).count() as u64)
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> Result<BookingRecord> {
        if !self.working.schedules.contains_key(&booking.schedule_id) {
            return Err(StoreError::RowNotFound {
                table: "schedules",
                id: booking.schedule_id.as_i64(),
            });
        }
        self.working.next_booking_id += 1;
        let record = booking.into_record(BookingId::new(self.working.next_booking_id));
        self.working
            .bookings
            .insert(record.booking_id, record.clone());
        Ok(record)
    }

    async fn update_booking(&mut self, booking: &BookingRecord) -> Result<()> {
        match self.working.bookings.get_mut(&booking.booking_id) {
            Some(row) => {
                *row = booking.clone();
                Ok(())
            }
            None => Err(StoreError::RowNotFound {
                table: "bookings",
                id: booking.booking_id.as_i64(),
            }),
        }
    }

    async fn set_schedule_reserved(
        &mut self,
        schedule_id: ScheduleId,
        reserved: bool,
    ) -> Result<()> {
        match self.working.schedules.get_mut(&schedule_id) {
            Some(slot) => {
                slot.is_reserved = reserved;
                Ok(())
            }
            None => Err(StoreError::RowNotFound {
                table: "schedules",
                id: schedule_id.as_i64(),
            }),
        }
    }

    async fn commit(mut self) -> Result<()> {
        if self.fail_on_commit.load(Ordering::SeqCst) {
            tracing::warn!("in-memory commit failure injected");
            return Err(StoreError::Unavailable("commit failed".to_string()));
        }
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Utc};

    use super::*;

    fn date(d: &str) -> NaiveDate {
        d.parse().unwrap()
    }

    fn time(t: &str) -> NaiveTime {
        NaiveTime::parse_from_str(t, "%H:%M").unwrap()
    }

    async fn store_with_slot() -> (InMemoryBookingStore, ScheduleRecord) {
        let store = InMemoryBookingStore::new();
        let vehicle_id = store
            .add_vehicle(NewVehicle {
                vehicle_type: "Sedan".to_string(),
                brand: "Toyota".to_string(),
                model: "Corolla".to_string(),
                license_plate: "SGX1234A".to_string(),
                hourly_rate: Money::from_units(10),
            })
            .await
            .unwrap();
        let slot = store
            .add_schedule(NewSchedule {
                vehicle_id,
                date: date("2030-05-01"),
                start_time: time("10:00"),
                end_time: time("12:00"),
            })
            .await
            .unwrap();
        (store, slot)
    }

    fn new_booking(slot: &ScheduleRecord, user: i64, status: &str) -> NewBooking {
        NewBooking {
            schedule_id: slot.schedule_id,
            user_id: UserId::new(user),
            status: status.to_string(),
            base_cost: Money::from_units(20),
            promo_code: None,
            membership_discount: Money::zero(),
            promotion_discount: Money::zero(),
            discount_applied: Money::zero(),
            total_amount: Money::from_units(20),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn commit_publishes_booking_and_reservation_together() {
        let (store, slot) = store_with_slot().await;

        let mut tx = store.begin().await.unwrap();
        let booking = tx
            .insert_booking(new_booking(&slot, 1, "Pending"))
            .await
            .unwrap();
        tx.set_schedule_reserved(slot.schedule_id, true)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.get_booking(booking.booking_id).await.unwrap();
        assert_eq!(stored, Some(booking));
        let slot = store.get_schedule(slot.schedule_id).await.unwrap().unwrap();
        assert!(slot.is_reserved);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (store, slot) = store_with_slot().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_booking(new_booking(&slot, 1, "Pending"))
                .await
                .unwrap();
            tx.set_schedule_reserved(slot.schedule_id, true)
                .await
                .unwrap();
        }

        assert_eq!(store.booking_count().await, 0);
        let slot = store.get_schedule(slot.schedule_id).await.unwrap().unwrap();
        assert!(!slot.is_reserved);
    }

    #[tokio::test]
    async fn injected_commit_failure_discards_changes() {
        let (store, slot) = store_with_slot().await;
        store.set_fail_on_commit(true);

        let mut tx = store.begin().await.unwrap();
        tx.set_schedule_reserved(slot.schedule_id, true)
            .await
            .unwrap();
        let result = tx.commit().await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        let slot = store.get_schedule(slot.schedule_id).await.unwrap().unwrap();
        assert!(!slot.is_reserved);
    }

    #[tokio::test]
    async fn counts_only_requested_statuses() {
        let (store, slot) = store_with_slot().await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(new_booking(&slot, 1, "Confirmed"))
            .await
            .unwrap();
        tx.insert_booking(new_booking(&slot, 1, "Cancelled"))
            .await
            .unwrap();
        tx.insert_booking(new_booking(&slot, 2, "Confirmed"))
            .await
            .unwrap();
        let count = tx
            .count_user_bookings(UserId::new(1), &["Confirmed", "Completed"])
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn available_listings_skip_reserved_slots() {
        let (store, slot) = store_with_slot().await;

        let available = store
            .list_available_schedules(date("2030-05-01"))
            .await
            .unwrap();
        assert_eq!(available.len(), 1);

        let mut tx = store.begin().await.unwrap();
        tx.set_schedule_reserved(slot.schedule_id, true)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(
            store
                .list_available_schedules(date("2030-05-01"))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            store
                .list_available_by_rate(Money::from_units(10), date("2030-01-01"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn update_of_missing_booking_fails() {
        let (store, slot) = store_with_slot().await;
        let mut tx = store.begin().await.unwrap();
        let mut record = new_booking(&slot, 1, "Pending").into_record(BookingId::new(99));
        record.status = "Cancelled".to_string();

        let result = tx.update_booking(&record).await;
        assert!(matches!(
            result,
            Err(StoreError::RowNotFound { table: "bookings", id: 99 })
        ));
    }
}
