//! Seeded in-memory fleet and collaborators for running the server without
//! a database or the user, promotion and billing services.
//!
//! Schedules are laid out day by day for the next two weeks, then by
//! vehicle, then by slot, so the first day's ids are:
//!
//! | id | vehicle | slot |
//! |----|---------|------|
//! | 1, 2 | Toyota Corolla (Sedan, 10/h) | 09:00-11:00, 14:00-17:00 |
//! | 3, 4 | Hyundai Elantra (Sedan, 10/h) | 09:00-11:00, 14:00-17:00 |
//! | 5, 6 | Honda CR-V (SUV, 15/h) | 09:00-11:00, 14:00-17:00 |

use std::sync::Arc;

use booking_store::{InMemoryBookingStore, NewSchedule, NewVehicle, StoreError};
use chrono::{Datelike, NaiveDate, NaiveTime, TimeDelta};
use common::{Money, UserId};
use domain::{Clock, DriverProfile, Membership, Promotion};
use rust_decimal::Decimal;
use saga::{
    Collaborators, InMemoryBillingGateway, InMemoryPromotionCatalog, InMemoryUserDirectory,
    StoredCard,
};

/// Card number every demo driver pays with.
pub const DEMO_CARD_NUMBER: &str = "4111111111111111";
/// CVV of the demo card.
pub const DEMO_CARD_CVV: &str = "123";

const SCHEDULE_DAYS: i64 = 14;
const SLOTS: [(i64, i64); 2] = [(9, 11), (14, 17)];

/// In-memory stand-ins for the three collaborator services.
#[derive(Clone)]
pub struct DemoServices {
    pub users: InMemoryUserDirectory,
    pub promotions: InMemoryPromotionCatalog,
    pub billing: InMemoryBillingGateway,
}

impl DemoServices {
    /// Creates the collaborators with demo drivers, tiers, promotions and
    /// cards whose validity is relative to `today`.
    pub fn new(clock: Arc<dyn Clock>, today: NaiveDate) -> Self {
        let services = Self {
            users: InMemoryUserDirectory::new(),
            promotions: InMemoryPromotionCatalog::new(),
            billing: InMemoryBillingGateway::with_clock(clock),
        };
        services.seed(today);
        services
    }

    /// Returns the services as saga collaborators.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            users: Arc::new(self.users.clone()),
            memberships: Arc::new(self.users.clone()),
            promotions: Arc::new(self.promotions.clone()),
            billing: Arc::new(self.billing.clone()),
        }
    }

    fn seed(&self, today: NaiveDate) {
        for (membership_id, discount, limit) in [("Basic", 0, 2), ("Premium", 10, 5), ("VIP", 20, 10)]
        {
            self.users.add_membership(Membership {
                membership_id: membership_id.to_string(),
                hourly_rate_discount_pct: Decimal::from(discount),
                booking_limit: limit,
            });
        }

        let license_expiry = today + TimeDelta::days(3 * 365);
        let card_expiry = format!("12/{:02}", (today.year() + 3) % 100);
        for (user_id, membership_id) in [(1, "Premium"), (2, "Basic"), (3, "VIP")] {
            let user_id = UserId::new(user_id);
            self.users.add_user(DriverProfile {
                user_id,
                membership_id: membership_id.to_string(),
                license_expiry,
            });
            self.billing.add_card(
                user_id,
                StoredCard {
                    number: DEMO_CARD_NUMBER.to_string(),
                    expiry: card_expiry.clone(),
                    cvv: DEMO_CARD_CVV.to_string(),
                    balance: Money::from_units(500),
                },
            );
        }

        self.promotions.add_promotion(Promotion {
            code: "WELCOME10".to_string(),
            name: "Welcome offer".to_string(),
            discount_pct: Decimal::from(10),
            valid_from: today - TimeDelta::days(30),
            valid_to: today + TimeDelta::days(60),
        });
        self.promotions.add_promotion(Promotion {
            code: "SUMMER15".to_string(),
            name: "Summer sale".to_string(),
            discount_pct: Decimal::from(15),
            valid_from: today + TimeDelta::days(90),
            valid_to: today + TimeDelta::days(180),
        });
    }
}

/// Registers the demo fleet and opens its slots for the two weeks after
/// `today`.
pub async fn seed_fleet(store: &InMemoryBookingStore, today: NaiveDate) -> Result<(), StoreError> {
    let fleet = [
        ("Sedan", "Toyota", "Corolla", "SGX1234A", 10),
        ("Sedan", "Hyundai", "Elantra", "SGY5678B", 10),
        ("SUV", "Honda", "CR-V", "SGZ9012C", 15),
    ];

    let mut vehicle_ids = Vec::with_capacity(fleet.len());
    for (vehicle_type, brand, model, plate, rate) in fleet {
        let id = store
            .add_vehicle(NewVehicle {
                vehicle_type: vehicle_type.to_string(),
                brand: brand.to_string(),
                model: model.to_string(),
                license_plate: plate.to_string(),
                hourly_rate: Money::from_units(rate),
            })
            .await?;
        vehicle_ids.push(id);
    }

    for day in 1..=SCHEDULE_DAYS {
        let date = today + TimeDelta::days(day);
        for &vehicle_id in &vehicle_ids {
            for (start, end) in SLOTS {
                store
                    .add_schedule(NewSchedule {
                        vehicle_id,
                        date,
                        start_time: hour(start),
                        end_time: hour(end),
                    })
                    .await?;
            }
        }
    }

    tracing::info!(
        vehicles = vehicle_ids.len(),
        days = SCHEDULE_DAYS,
        "seeded demo fleet"
    );
    Ok(())
}

fn hour(h: i64) -> NaiveTime {
    NaiveTime::MIN + TimeDelta::hours(h)
}
