//! Lead-time rules for cancelling and rescheduling.

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use super::{BookingError, ScheduleSlot};

/// Reference timezone for slot dates and times.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Singapore;

/// Minimum notice, in hours, for cancelling or moving a confirmed booking.
pub const DEFAULT_MINIMUM_LEAD_HOURS: i64 = 24;

/// Interprets slot times in a fixed timezone and enforces the minimum notice.
///
/// A slot starting at `T` may be cancelled or moved while `now <= T - minimum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadTimePolicy {
    pub timezone: Tz,
    pub minimum: TimeDelta,
}

impl Default for LeadTimePolicy {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            minimum: TimeDelta::hours(DEFAULT_MINIMUM_LEAD_HOURS),
        }
    }
}

impl LeadTimePolicy {
    /// Creates a policy for the given timezone and minimum notice.
    pub fn new(timezone: Tz, minimum: TimeDelta) -> Self {
        Self { timezone, minimum }
    }

    /// Returns the instant a slot starts.
    pub fn slot_start(&self, slot: &ScheduleSlot) -> DateTime<Utc> {
        let local = slot.date.and_time(slot.start_time);
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            // Only reachable inside a DST gap; read the wall time as UTC.
            .unwrap_or_else(|| local.and_utc())
    }

    /// Returns the calendar date at `now` in the reference timezone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Returns the time left before a slot starts.
    pub fn remaining(&self, slot: &ScheduleSlot, now: DateTime<Utc>) -> TimeDelta {
        self.slot_start(slot) - now
    }

    /// Fails with `TooLateToCancel` when less than the minimum notice remains.
    pub fn ensure_cancellable(
        &self,
        slot: &ScheduleSlot,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if self.remaining(slot, now) < self.minimum {
            return Err(BookingError::TooLateToCancel {
                starts_at: self.slot_start(slot),
            });
        }
        Ok(())
    }

    /// Fails with `WithinLeadWindow` when `now + minimum` is past the slot start.
    pub fn ensure_outside_window(
        &self,
        slot: &ScheduleSlot,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if now + self.minimum > self.slot_start(slot) {
            return Err(BookingError::WithinLeadWindow {
                starts_at: self.slot_start(slot),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use common::{Money, ScheduleId};

    use super::*;

    fn slot(date: &str, start: &str) -> ScheduleSlot {
        ScheduleSlot {
            schedule_id: ScheduleId::new(1),
            vehicle_id: 1,
            vehicle_type: "Sedan".to_string(),
            brand: "Toyota".to_string(),
            model: "Corolla".to_string(),
            license_plate: "SGX1234A".to_string(),
            hourly_rate: Money::from_units(10),
            date: date.parse().unwrap(),
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            is_reserved: true,
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn slot_times_are_read_in_reference_timezone() {
        let policy = LeadTimePolicy::default();
        // 10:00 in Singapore (UTC+8) is 02:00 UTC.
        assert_eq!(
            policy.slot_start(&slot("2030-05-10", "10:00")),
            utc("2030-05-10T02:00:00Z")
        );
    }

    #[test]
    fn today_follows_reference_timezone() {
        let policy = LeadTimePolicy::default();
        assert_eq!(
            policy.today(utc("2030-05-09T17:00:00Z")),
            "2030-05-10".parse::<NaiveDate>().unwrap()
        );
    }

    #[test]
    fn cancellation_boundary_is_inclusive() {
        let policy = LeadTimePolicy::default();
        let s = slot("2030-05-10", "10:00");
        let start = policy.slot_start(&s);

        assert!(
            policy
                .ensure_cancellable(&s, start - TimeDelta::hours(24) - TimeDelta::seconds(1))
                .is_ok()
        );
        assert!(policy.ensure_cancellable(&s, start - TimeDelta::hours(24)).is_ok());
        assert!(matches!(
            policy.ensure_cancellable(&s, start - TimeDelta::hours(24) + TimeDelta::seconds(1)),
            Err(BookingError::TooLateToCancel { .. })
        ));
    }

    #[test]
    fn reschedule_window_matches_cancellation_boundary() {
        let policy = LeadTimePolicy::default();
        let s = slot("2030-05-10", "10:00");
        let start = policy.slot_start(&s);

        assert!(policy.ensure_outside_window(&s, start - TimeDelta::hours(24)).is_ok());
        assert!(matches!(
            policy.ensure_outside_window(&s, start - TimeDelta::hours(23)),
            Err(BookingError::WithinLeadWindow { .. })
        ));
    }
}
