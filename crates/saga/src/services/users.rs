//! In-memory user service.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::UserId;
use domain::{DriverProfile, Membership};

use super::{CollaboratorError, MembershipCatalog, UserDirectory};

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<UserId, DriverProfile>,
    memberships: HashMap<String, Membership>,
    fail_on_lookup: bool,
}

/// In-memory drivers and membership tiers, for tests and the demo server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a driver.
    pub fn add_user(&self, profile: DriverProfile) {
        self.write().users.insert(profile.user_id, profile);
    }

    /// Registers or replaces a membership tier.
    pub fn add_membership(&self, membership: Membership) {
        self.write()
            .memberships
            .insert(membership.membership_id.clone(), membership);
    }

    /// Makes every lookup fail as if the service were down.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.write().fail_on_lookup = fail;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryUserState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryUserState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        if self.read().fail_on_lookup {
            return Err(CollaboratorError::Unavailable(
                "user service unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: UserId) -> Result<DriverProfile, CollaboratorError> {
        self.check_available()?;
        self.read()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }
}

#[async_trait]
impl MembershipCatalog for InMemoryUserDirectory {
    async fn get_membership(&self, membership_id: &str) -> Result<Membership, CollaboratorError> {
        self.check_available()?;
        self.read()
            .memberships
            .get(membership_id)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn driver(id: i64) -> DriverProfile {
        DriverProfile {
            user_id: UserId::new(id),
            membership_id: "Basic".to_string(),
            license_expiry: "2031-01-01".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_lookup_registered_user_and_membership() {
        let users = InMemoryUserDirectory::new();
        users.add_user(driver(1));
        users.add_membership(Membership {
            membership_id: "Basic".to_string(),
            hourly_rate_discount_pct: Decimal::ZERO,
            booking_limit: 2,
        });

        let profile = users.get_user(UserId::new(1)).await.unwrap();
        assert_eq!(profile.membership_id, "Basic");
        let membership = users.get_membership("Basic").await.unwrap();
        assert_eq!(membership.booking_limit, 2);
    }

    #[tokio::test]
    async fn test_unknown_entries_are_not_found() {
        let users = InMemoryUserDirectory::new();
        assert_eq!(
            users.get_user(UserId::new(9)).await,
            Err(CollaboratorError::NotFound)
        );
        assert_eq!(
            users.get_membership("Gold").await,
            Err(CollaboratorError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_fail_on_lookup() {
        let users = InMemoryUserDirectory::new();
        users.add_user(driver(1));
        users.set_fail_on_lookup(true);

        assert!(matches!(
            users.get_user(UserId::new(1)).await,
            Err(CollaboratorError::Unavailable(_))
        ));
    }
}
