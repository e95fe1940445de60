pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryBookingStore, InMemoryTransaction};
pub use postgres::{PostgresBookingStore, PostgresTransaction};
pub use records::{BookedSlot, BookingRecord, NewBooking, NewSchedule, NewVehicle, ScheduleRecord};
pub use store::{BookingStore, StoreTransaction};
