//! In-memory billing service.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use common::{Money, UserId};
use domain::{Clock, SystemClock};
use uuid::Uuid;

use super::{BillingGateway, CollaboratorError, PaymentReceipt, PaymentRequest};

/// A card on file with its available balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCard {
    pub number: String,
    /// Expiry in `MM/YY` form. The card is usable through the end of that month.
    pub expiry: String,
    pub cvv: String,
    pub balance: Money,
}

#[derive(Debug, Default)]
struct InMemoryBillingState {
    cards: HashMap<UserId, StoredCard>,
    charges: HashMap<Uuid, Charge>,
    next_id: u32,
    fail_on_submit: bool,
    fail_on_refund: bool,
}

#[derive(Debug)]
struct Charge {
    user_id: UserId,
    receipt: PaymentReceipt,
}

/// In-memory billing with one card per driver, for tests and the demo server.
#[derive(Clone)]
pub struct InMemoryBillingGateway {
    state: Arc<RwLock<InMemoryBillingState>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryBillingGateway {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryBillingGateway {
    /// Creates a gateway that checks card expiry against the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway that checks card expiry against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::default(),
            clock,
        }
    }

    /// Puts a card on file for a driver, replacing any previous one.
    pub fn add_card(&self, user_id: UserId, card: StoredCard) {
        self.write().cards.insert(user_id, card);
    }

    /// Returns the remaining balance of the driver's card.
    pub fn balance(&self, user_id: UserId) -> Option<Money> {
        self.read().cards.get(&user_id).map(|card| card.balance)
    }

    /// Returns the number of successful charges not refunded.
    pub fn payment_count(&self) -> usize {
        self.read().charges.len()
    }

    /// Makes every charge fail as if the service were down.
    pub fn set_fail_on_submit(&self, fail: bool) {
        self.write().fail_on_submit = fail;
    }

    /// Makes every refund fail as if the service were down.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryBillingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryBillingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns `None` for a malformed expiry.
fn card_expired(expiry: &str, today: NaiveDate) -> Option<bool> {
    let (month, year) = expiry.split_once('/')?;
    let month: u32 = month.trim().parse().ok()?;
    let year: i32 = year.trim().parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((2000 + year, month) < (today.year(), today.month()))
}

#[async_trait]
impl BillingGateway for InMemoryBillingGateway {
    async fn submit_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentReceipt, CollaboratorError> {
        let today = self.clock.now().date_naive();
        let mut state = self.write();

        if state.fail_on_submit {
            return Err(CollaboratorError::Unavailable(
                "billing service unavailable".to_string(),
            ));
        }
        if let Some(charge) = state.charges.get(&request.idempotency_key) {
            return Ok(charge.receipt.clone());
        }

        let amount = request.amount;
        let Some(card) = state.cards.get_mut(&request.user_id) else {
            return Ok(PaymentReceipt::declined(amount, "Card not found"));
        };
        let presented = &request.card;
        if presented.number != card.number {
            return Ok(PaymentReceipt::declined(amount, "Card number does not match"));
        }
        if presented.expiry != card.expiry {
            return Ok(PaymentReceipt::declined(amount, "Card expiry does not match"));
        }
        if presented.cvv != card.cvv {
            return Ok(PaymentReceipt::declined(amount, "CVV does not match"));
        }
        match card_expired(&card.expiry, today) {
            None => {
                return Err(CollaboratorError::Invalid(format!(
                    "stored card expiry {:?} is malformed",
                    card.expiry
                )));
            }
            Some(true) => return Ok(PaymentReceipt::declined(amount, "Card expired")),
            Some(false) => {}
        }
        if card.balance < amount {
            return Ok(PaymentReceipt::declined(amount, "Insufficient balance"));
        }
        card.balance -= amount;

        state.next_id += 1;
        let receipt = PaymentReceipt {
            payment_id: Some(format!("PAY-{:04}", state.next_id)),
            amount,
            payment_success: true,
            message: "Payment successful".to_string(),
        };
        state.charges.insert(
            request.idempotency_key,
            Charge {
                user_id: request.user_id,
                receipt: receipt.clone(),
            },
        );
        Ok(receipt)
    }

    async fn refund(&self, idempotency_key: Uuid) -> Result<(), CollaboratorError> {
        let mut state = self.write();
        if state.fail_on_refund {
            return Err(CollaboratorError::Unavailable(
                "billing service unavailable".to_string(),
            ));
        }
        let charge = state
            .charges
            .remove(&idempotency_key)
            .ok_or(CollaboratorError::NotFound)?;
        if let Some(card) = state.cards.get_mut(&charge.user_id) {
            card.balance += charge.receipt.amount;
        }
        Ok(())
    }
}
