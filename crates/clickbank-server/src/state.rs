//! Application State

use std::sync::Arc;

use clickbank_payments::{
    BindingStore, ClickBankCheckout, GatewayConfig, MemoryCartStore, MemoryOrderStore,
    NotificationHandler,
};

pub type Notifications = NotificationHandler<dyn BindingStore, MemoryOrderStore, MemoryCartStore>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Gateway settings (nickname, secret, success page)
    pub config: Arc<GatewayConfig>,

    /// Product ↔ ClickBank item bindings
    pub bindings: Arc<dyn BindingStore>,

    /// Recorded orders
    pub orders: Arc<MemoryOrderStore>,

    /// Session carts
    pub carts: Arc<MemoryCartStore>,

    /// Return-leg verifier and recorder
    pub notifications: Arc<Notifications>,

    /// Forward-leg redirect builder
    pub checkout: Arc<ClickBankCheckout<dyn BindingStore>>,
}

impl AppState {
    pub fn new(config: GatewayConfig, bindings: Arc<dyn BindingStore>) -> Self {
        let config = Arc::new(config);
        let orders = Arc::new(MemoryOrderStore::new());
        let carts = Arc::new(MemoryCartStore::new());

        Self {
            notifications: Arc::new(NotificationHandler::new(
                config.clone(),
                bindings.clone(),
                orders.clone(),
                carts.clone(),
            )),
            checkout: Arc::new(ClickBankCheckout::new(config.clone(), bindings.clone())),
            config,
            bindings,
            orders,
            carts,
        }
    }
}
