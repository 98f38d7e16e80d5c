//! Session Carts
//!
//! Minimal server-side cart keyed by session id. Checkout puts the product in
//! the cart; a verified notification empties it.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::binding::ProductId;
use crate::error::{PaymentError, Result};

/// Cart storage trait
pub trait CartStore: Send + Sync {
    fn add_item(&self, session: &str, product: ProductId) -> Result<()>;

    fn items(&self, session: &str) -> Result<Vec<ProductId>>;

    /// Remove every item in the session's cart
    fn empty(&self, session: &str) -> Result<()>;
}

/// In-memory cart store
#[derive(Default)]
pub struct MemoryCartStore {
    carts: RwLock<HashMap<String, Vec<ProductId>>>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("cart lock poisoned".into())
}

impl CartStore for MemoryCartStore {
    fn add_item(&self, session: &str, product: ProductId) -> Result<()> {
        let mut carts = self.carts.write().map_err(poisoned)?;
        let cart = carts.entry(session.to_string()).or_default();
        if !cart.contains(&product) {
            cart.push(product);
        }
        Ok(())
    }

    fn items(&self, session: &str) -> Result<Vec<ProductId>> {
        let carts = self.carts.read().map_err(poisoned)?;
        Ok(carts.get(session).cloned().unwrap_or_default())
    }

    fn empty(&self, session: &str) -> Result<()> {
        let mut carts = self.carts.write().map_err(poisoned)?;
        carts.remove(session);
        Ok(())
    }
}
