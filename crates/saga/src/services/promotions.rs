//! In-memory promotion service.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::Promotion;

use super::{CollaboratorError, PromotionCatalog};

#[derive(Debug, Default)]
struct InMemoryPromotionState {
    promotions: HashMap<String, Promotion>,
    fail_on_lookup: bool,
}

/// In-memory promotion codes, for tests and the demo server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPromotionCatalog {
    state: Arc<RwLock<InMemoryPromotionState>>,
}

impl InMemoryPromotionCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a promotion under its code.
    pub fn add_promotion(&self, promotion: Promotion) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .promotions
            .insert(promotion.code.clone(), promotion);
    }

    /// Makes every lookup fail as if the service were down.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_lookup = fail;
    }
}

#[async_trait]
impl PromotionCatalog for InMemoryPromotionCatalog {
    async fn get_promotion(&self, code: &str) -> Result<Promotion, CollaboratorError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_lookup {
            return Err(CollaboratorError::Unavailable(
                "promotion service unavailable".to_string(),
            ));
        }
        state
            .promotions
            .get(code)
            .cloned()
            .ok_or(CollaboratorError::NotFound)
    }
}
