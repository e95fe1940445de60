use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BookingId, Money, ScheduleId, UserId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    BookedSlot, BookingRecord, NewBooking, NewSchedule, NewVehicle, Result, ScheduleRecord,
    StoreError,
    store::{BookingStore, StoreTransaction},
};

const SELECT_SCHEDULE: &str = r#"
    SELECT s.schedule_id, s.vehicle_id, v.vehicle_type, v.brand, v.model, v.license_plate,
           v.hourly_rate, s.schedule_date, s.start_time, s.end_time, s.is_reserved
    FROM schedules s
    JOIN vehicles v ON v.vehicle_id = s.vehicle_id
"#;

const SELECT_BOOKING: &str = r#"
    SELECT booking_id, schedule_id, user_id, status, base_cost, promo_code,
           membership_discount, promotion_discount, discount_applied, total_amount,
           confirmation_key, created_at, updated_at
    FROM bookings
"#;

const SELECT_BOOKED_SLOT: &str = r#"
    SELECT b.booking_id, b.schedule_id, b.user_id, b.status, b.base_cost, b.promo_code,
           b.membership_discount, b.promotion_discount, b.discount_applied, b.total_amount,
           b.confirmation_key, b.created_at, b.updated_at,
           s.vehicle_id, v.vehicle_type, v.brand, v.model, v.license_plate,
           v.hourly_rate, s.schedule_date, s.start_time, s.end_time, s.is_reserved
    FROM bookings b
    JOIN schedules s ON s.schedule_id = b.schedule_id
    JOIN vehicles v ON v.vehicle_id = s.vehicle_id
"#;

/// PostgreSQL-backed booking store.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Creates a new PostgreSQL booking store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::debug!("booking store migrations applied");
        Ok(())
    }

    /// Registers a vehicle and returns its identifier.
    pub async fn add_vehicle(&self, vehicle: NewVehicle) -> Result<i64> {
        let vehicle_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO vehicles (vehicle_type, brand, model, license_plate, hourly_rate)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING vehicle_id
            "#,
        )
        .bind(&vehicle.vehicle_type)
        .bind(&vehicle.brand)
        .bind(&vehicle.model)
        .bind(&vehicle.license_plate)
        .bind(vehicle.hourly_rate.amount())
        .fetch_one(&self.pool)
        .await?;

        Ok(vehicle_id)
    }

    /// Opens an unreserved slot for a registered vehicle.
    pub async fn add_schedule(&self, schedule: NewSchedule) -> Result<ScheduleRecord> {
        let schedule_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO schedules (vehicle_id, schedule_date, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            RETURNING schedule_id
            "#,
        )
        .bind(schedule.vehicle_id)
        .bind(schedule.date)
        .bind(schedule.start_time)
        .bind(schedule.end_time)
        .fetch_one(&self.pool)
        .await?;

        self.get_schedule(ScheduleId::new(schedule_id))
            .await?
            .ok_or(StoreError::RowNotFound {
                table: "schedules",
                id: schedule_id,
            })
    }

    fn row_to_schedule(row: &PgRow) -> Result<ScheduleRecord> {
        Ok(ScheduleRecord {
            schedule_id: ScheduleId::new(row.try_get("schedule_id")?),
            vehicle_id: row.try_get("vehicle_id")?,
            vehicle_type: row.try_get("vehicle_type")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            license_plate: row.try_get("license_plate")?,
            hourly_rate: Money::new(row.try_get::<Decimal, _>("hourly_rate")?),
            date: row.try_get("schedule_date")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            is_reserved: row.try_get("is_reserved")?,
        })
    }

    fn row_to_booking(row: &PgRow) -> Result<BookingRecord> {
        Ok(BookingRecord {
            booking_id: BookingId::new(row.try_get("booking_id")?),
            schedule_id: ScheduleId::new(row.try_get("schedule_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            status: row.try_get("status")?,
            base_cost: Money::new(row.try_get::<Decimal, _>("base_cost")?),
            promo_code: row.try_get("promo_code")?,
            membership_discount: Money::new(row.try_get::<Decimal, _>("membership_discount")?),
            promotion_discount: Money::new(row.try_get::<Decimal, _>("promotion_discount")?),
            discount_applied: Money::new(row.try_get::<Decimal, _>("discount_applied")?),
            total_amount: Money::new(row.try_get::<Decimal, _>("total_amount")?),
            confirmation_key: row.try_get("confirmation_key")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn status_list(statuses: &[&str]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    async fn get_schedule(&self, schedule_id: ScheduleId) -> Result<Option<ScheduleRecord>> {
        let row = sqlx::query(&format!("{SELECT_SCHEDULE} WHERE s.schedule_id = $1"))
            .bind(schedule_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<BookingRecord>> {
        let row = sqlx::query(&format!("{SELECT_BOOKING} WHERE booking_id = $1"))
            .bind(booking_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_booking).transpose()
    }

    async fn list_available_schedules(&self, date: NaiveDate) -> Result<Vec<ScheduleRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_SCHEDULE} WHERE s.schedule_date = $1 AND NOT s.is_reserved \
             ORDER BY s.start_time ASC, s.schedule_id ASC"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn list_available_by_rate(
        &self,
        hourly_rate: Money,
        from_date: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_SCHEDULE} WHERE v.hourly_rate = $1 AND s.schedule_date >= $2 \
             AND NOT s.is_reserved \
             ORDER BY s.schedule_date ASC, s.start_time ASC, s.schedule_id ASC"
        ))
        .bind(hourly_rate.amount())
        .bind(from_date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    async fn list_user_bookings(
        &self,
        user_id: UserId,
        statuses: &[&str],
    ) -> Result<Vec<BookedSlot>> {
        let rows = sqlx::query(&format!(
            "{SELECT_BOOKED_SLOT} WHERE b.user_id = $1 AND b.status = ANY($2) \
             ORDER BY s.schedule_date ASC, s.start_time ASC, b.booking_id ASC"
        ))
        .bind(user_id.as_i64())
        .bind(status_list(statuses))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(BookedSlot {
                    booking: Self::row_to_booking(row)?,
                    schedule: Self::row_to_schedule(row)?,
                })
            })
            .collect()
    }
}

/// Transaction over a [`PostgresBookingStore`].
///
/// Locked rows are held with `SELECT ... FOR UPDATE`; dropping the handle
/// rolls the transaction back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn lock_schedule(&mut self, schedule_id: ScheduleId) -> Result<Option<ScheduleRecord>> {
        let row = sqlx::query(&format!(
            "{SELECT_SCHEDULE} WHERE s.schedule_id = $1 FOR UPDATE OF s"
        ))
        .bind(schedule_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref()
            .map(PostgresBookingStore::row_to_schedule)
            .transpose()
    }

    async fn lock_booking(&mut self, booking_id: BookingId) -> Result<Option<BookingRecord>> {
        let row = sqlx::query(&format!("{SELECT_BOOKING} WHERE booking_id = $1 FOR UPDATE"))
            .bind(booking_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref()
            .map(PostgresBookingStore::row_to_booking)
            .transpose()
    }

    async fn count_user_bookings(&mut self, user_id: UserId, statuses: &[&str]) -> Result<u64> {
        // Serializes limit checks for one user across slots.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(user_id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND status = ANY($2)",
        )
        .bind(user_id.as_i64())
        .bind(status_list(statuses))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> Result<BookingRecord> {
        let booking_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (schedule_id, user_id, status, base_cost, promo_code,
                                  membership_discount, promotion_discount, discount_applied,
                                  total_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING booking_id
            "#,
        )
        .bind(booking.schedule_id.as_i64())
        .bind(booking.user_id.as_i64())
        .bind(&booking.status)
        .bind(booking.base_cost.amount())
        .bind(&booking.promo_code)
        .bind(booking.membership_discount.amount())
        .bind(booking.promotion_discount.amount())
        .bind(booking.discount_applied.amount())
        .bind(booking.total_amount.amount())
        .bind(booking.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(booking.into_record(BookingId::new(booking_id)))
    }

    async fn update_booking(&mut self, booking: &BookingRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                schedule_id = $2,
                status = $3,
                base_cost = $4,
                promo_code = $5,
                membership_discount = $6,
                promotion_discount = $7,
                discount_applied = $8,
                total_amount = $9,
                confirmation_key = $10,
                updated_at = $11
            WHERE booking_id = $1
            "#,
        )
        .bind(booking.booking_id.as_i64())
        .bind(booking.schedule_id.as_i64())
        .bind(&booking.status)
        .bind(booking.base_cost.amount())
        .bind(&booking.promo_code)
        .bind(booking.membership_discount.amount())
        .bind(booking.promotion_discount.amount())
        .bind(booking.discount_applied.amount())
        .bind(booking.total_amount.amount())
        .bind(booking.confirmation_key)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                table: "bookings",
                id: booking.booking_id.as_i64(),
            });
        }
        Ok(())
    }

    async fn set_schedule_reserved(
        &mut self,
        schedule_id: ScheduleId,
        reserved: bool,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE schedules SET is_reserved = $2 WHERE schedule_id = $1")
            .bind(schedule_id.as_i64())
            .bind(reserved)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                table: "schedules",
                id: schedule_id.as_i64(),
            });
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
