//! # clickbank-payments
//!
//! ClickBank as a payment gateway for a digital download store.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  forward leg   ┌──────────────────┐  return leg   ┌─────────────┐
//! │  Your Shop  │───────────────▶│  ClickBank Order │──────────────▶│  Your Shop  │
//! │ (checkout)  │                │       Form       │  ?cbpop=...   │  (notify)   │
//! └─────────────┘                └──────────────────┘               └──────┬──────┘
//!                                                                          │ 302
//!                                                                          ▼
//!                                                                  success page
//!                                                                  ?payment_key=...
//! ```
//!
//! The forward leg redirects to `http://ITEM.VENDOR.pay.clickbank.net/` for a
//! product bound to a ClickBank item code. The return leg carries the buyer's
//! details and a `cbpop` proof token; [`NotificationHandler`] verifies it and
//! records one completed [`Order`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clickbank_payments::*;
//!
//! let config = Arc::new(GatewayConfig::from_env()?);
//! let bindings = Arc::new(MemoryBindingStore::new());
//! bindings.set_item(ProductId(42), Some("ABC123"))?;
//!
//! let handler = NotificationHandler::new(
//!     config,
//!     bindings,
//!     Arc::new(MemoryOrderStore::new()),
//!     Arc::new(MemoryCartStore::new()),
//! );
//!
//! if let Some(redirect) = handler.handle(&notification, None) {
//!     // 302 to redirect.location
//! }
//! ```

mod binding;
mod cart;
mod checkout;
mod config;
mod error;
mod notification;
mod order;
mod signature;
mod webhook;

pub use binding::{
    BindingChange, BindingStore, FileBindingStore, MemoryBindingStore, ProductBindings, ProductId,
};
pub use cart::{CartStore, MemoryCartStore};
pub use checkout::{ClickBankCheckout, PAYMENT_KEY_PARAM, order_form_url, success_location};
pub use config::GatewayConfig;
pub use error::{PaymentError, Result};
pub use notification::{BuyerName, Notification, ParsedNotification};
pub use order::{
    GATEWAY, MemoryOrderStore, NewOrder, Order, OrderId, OrderStatus, OrderStore, PaymentKey,
};
pub use signature::{proof_token, verify_proof_token};
pub use webhook::{NotificationHandler, SuccessRedirect};
