//! HTTP route handlers.

pub mod bookings;
pub mod health;
pub mod metrics;
pub mod vehicles;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path segment, reporting `what` on failure.
fn parse_segment<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}: {raw}")))
}
