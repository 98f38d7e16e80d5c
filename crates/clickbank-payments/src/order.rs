//! Order Records
//!
//! Orders created from verified ClickBank notifications, and the store that
//! owns them. The store also holds the replay guard: each proof token can be
//! attached to exactly one order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::binding::ProductId;
use crate::error::{PaymentError, Result};

/// Gateway tag recorded on every order
pub const GATEWAY: &str = "ClickBank";

/// Order identifier (never zero)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access key handed to the buyer on the success page (32 lowercase hex chars)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentKey(String);

impl PaymentKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Complete,
}

/// Data needed to create an order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub product: ProductId,
    pub gateway: String,
}

/// A stored order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,

    /// Buyer-facing access key
    pub key: PaymentKey,

    pub email: String,
    pub first_name: String,
    pub last_name: String,

    /// Purchased products (one line item per ClickBank notification)
    pub downloads: Vec<ProductId>,

    pub gateway: String,
    pub status: OrderStatus,

    /// Proof token that authorized this order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_token: Option<String>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    fn from_new(id: OrderId, new: NewOrder) -> Self {
        Self {
            id,
            key: PaymentKey::generate(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            downloads: vec![new.product],
            gateway: new.gateway,
            status: OrderStatus::Pending,
            proof_token: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == OrderStatus::Complete
    }
}

/// Order storage trait
pub trait OrderStore: Send + Sync {
    /// Create a pending order with a fresh id and key
    fn create(&self, order: NewOrder) -> Result<Order>;

    /// Get order by id
    fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Get order by access key
    fn get_by_key(&self, key: &PaymentKey) -> Result<Option<Order>>;

    /// Order a proof token is attached to, if any
    fn find_by_proof_token(&self, token: &str) -> Result<Option<OrderId>>;

    /// Attach a proof token to an order (insert-if-absent).
    ///
    /// Fails with `ReplayedToken` if another order already holds the token.
    fn attach_proof_token(&self, id: OrderId, token: &str) -> Result<()>;

    /// Update an order's status
    fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<()>;

    /// Number of stored orders
    fn count(&self) -> Result<usize>;
}

#[derive(Default)]
struct OrderTables {
    next_id: u64,
    orders: HashMap<OrderId, Order>,
    by_key: HashMap<PaymentKey, OrderId>,
    by_token: HashMap<String, OrderId>,
}

/// In-memory order store (for development)
#[derive(Default)]
pub struct MemoryOrderStore {
    tables: RwLock<OrderTables>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All orders, oldest first
    pub fn list(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut orders: Vec<Order> = tables.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("order lock poisoned".into())
}

impl OrderStore for MemoryOrderStore {
    fn create(&self, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().map_err(poisoned)?;

        tables.next_id += 1;
        let id = OrderId(tables.next_id);
        let order = Order::from_new(id, order);

        tables.by_key.insert(order.key.clone(), id);
        tables.orders.insert(id, order.clone());

        Ok(order)
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.orders.get(&id).cloned())
    }

    fn get_by_key(&self, key: &PaymentKey) -> Result<Option<Order>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .by_key
            .get(key)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    fn find_by_proof_token(&self, token: &str) -> Result<Option<OrderId>> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.by_token.get(token).copied())
    }

    fn attach_proof_token(&self, id: OrderId, token: &str) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;

        if let Some(holder) = tables.by_token.get(token) {
            if *holder != id {
                return Err(PaymentError::ReplayedToken(*holder));
            }
            return Ok(());
        }

        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| PaymentError::Storage(format!("order {id} not found")))?;
        order.proof_token = Some(token.to_string());
        tables.by_token.insert(token.to_string(), id);

        Ok(())
    }

    fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| PaymentError::Storage(format!("order {id} not found")))?;

        order.status = status;
        order.completed_at = match status {
            OrderStatus::Complete => Some(Utc::now()),
            OrderStatus::Pending => None,
        };

        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.orders.len())
    }
}
