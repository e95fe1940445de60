//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use domain::{DEFAULT_MINIMUM_LEAD_HOURS, DEFAULT_TIMEZONE, LeadTimePolicy};

/// Output format of the fmt tracing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT` — bind address (default: `0.0.0.0:9000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL URL; unset runs on a seeded in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `5`)
/// - `USER_SERVICE_URL`, `PROMOTION_SERVICE_URL`, `BILLING_SERVICE_URL` —
///   collaborator base URLs; unset runs on in-memory collaborators
/// - `COLLABORATOR_TIMEOUT_MS` — per-request timeout (default: `5000`)
/// - `BOOKING_TIMEZONE` — reference timezone for slot times (default: `Asia/Singapore`)
/// - `BOOKING_MIN_LEAD_HOURS` — notice required to cancel or move (default: `24`)
///
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub user_service_url: Option<String>,
    pub promotion_service_url: Option<String>,
    pub billing_service_url: Option<String>,
    pub collaborator_timeout: Duration,
    pub timezone: Tz,
    pub min_lead_hours: i64,
}

/// Default user service URL used when only some collaborators are configured.
pub const DEFAULT_USER_SERVICE_URL: &str = "http://localhost:8000/api/v1";
/// Default promotion service URL used when only some collaborators are configured.
pub const DEFAULT_PROMOTION_SERVICE_URL: &str = "http://localhost:8080/api/v1";
/// Default billing service URL used when only some collaborators are configured.
pub const DEFAULT_BILLING_SERVICE_URL: &str = "http://localhost:8081/api/v1";

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup, falling back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let timezone = match get("BOOKING_TIMEZONE") {
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(timezone = %name, "unknown timezone, using {DEFAULT_TIMEZONE}");
                DEFAULT_TIMEZONE
            }),
            None => defaults.timezone,
        };

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_var(&get, "PORT").unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match get("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: get("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: parse_var(&get, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            user_service_url: get("USER_SERVICE_URL").filter(|v| !v.is_empty()),
            promotion_service_url: get("PROMOTION_SERVICE_URL").filter(|v| !v.is_empty()),
            billing_service_url: get("BILLING_SERVICE_URL").filter(|v| !v.is_empty()),
            collaborator_timeout: parse_var(&get, "COLLABORATOR_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.collaborator_timeout),
            timezone,
            min_lead_hours: parse_var(&get, "BOOKING_MIN_LEAD_HOURS")
                .filter(|hours| lead_window(*hours).is_some())
                .unwrap_or(defaults.min_lead_hours),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true if any collaborator URL is set, in which case all three
    /// collaborators are reached over HTTP.
    pub fn uses_remote_collaborators(&self) -> bool {
        self.user_service_url.is_some()
            || self.promotion_service_url.is_some()
            || self.billing_service_url.is_some()
    }

    /// Returns the lead-time rules for cancelling and rescheduling.
    pub fn lead_time_policy(&self) -> LeadTimePolicy {
        let minimum = lead_window(self.min_lead_hours)
            .unwrap_or_else(|| TimeDelta::hours(DEFAULT_MINIMUM_LEAD_HOURS));
        LeadTimePolicy::new(self.timezone, minimum)
    }
}

/// Returns `None` for a negative or unrepresentable number of hours.
fn lead_window(hours: i64) -> Option<TimeDelta> {
    if hours < 0 {
        return None;
    }
    TimeDelta::try_hours(hours)
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            user_service_url: None,
            promotion_service_url: None,
            billing_service_url: None,
            collaborator_timeout: Duration::from_millis(5000),
            timezone: DEFAULT_TIMEZONE,
            min_lead_hours: DEFAULT_MINIMUM_LEAD_HOURS,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.timezone, chrono_tz::Asia::Singapore);
        assert_eq!(config.collaborator_timeout, Duration::from_secs(5));
        assert!(!config.uses_remote_collaborators());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_values_from_environment() {
        let config = from_pairs(&[
            ("PORT", "9100"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/bookings"),
            ("BILLING_SERVICE_URL", "http://billing:8081/api/v1"),
            ("COLLABORATOR_TIMEOUT_MS", "250"),
            ("BOOKING_TIMEZONE", "Europe/London"),
            ("BOOKING_MIN_LEAD_HOURS", "48"),
        ]);

        assert_eq!(config.port, 9100);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/bookings")
        );
        assert!(config.uses_remote_collaborators());
        assert_eq!(config.collaborator_timeout, Duration::from_millis(250));
        assert_eq!(config.timezone, chrono_tz::Europe::London);
        assert_eq!(config.lead_time_policy().minimum, TimeDelta::hours(48));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("BOOKING_TIMEZONE", "Mars/Olympus"),
            ("DATABASE_URL", ""),
        ]);

        assert_eq!(config.port, 9000);
        assert_eq!(config.timezone, chrono_tz::Asia::Singapore);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_out_of_range_lead_hours_fall_back() {
        for hours in ["-1", "9223372036854775807", "-9223372036854775808"] {
            let config = from_pairs(&[("BOOKING_MIN_LEAD_HOURS", hours)]);
            assert_eq!(config.min_lead_hours, 24);
            assert_eq!(config.lead_time_policy().minimum, TimeDelta::hours(24));
        }

        let config = from_pairs(&[("BOOKING_MIN_LEAD_HOURS", "0")]);
        assert_eq!(config.lead_time_policy().minimum, TimeDelta::zero());

        let config = Config {
            min_lead_hours: -5,
            ..Config::default()
        };
        assert_eq!(config.lead_time_policy().minimum, TimeDelta::hours(24));
    }
}
