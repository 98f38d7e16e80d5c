//! ClickBank Notification Handling
//!
//! Verifies the thank-you page notification and records exactly one completed
//! order for it.
//!
//! Checks run in order and stop at the first failure: field presence, secret
//! configured, proof token, replay, product binding. Failures are silent to
//! the sender; [`NotificationHandler::handle`] only logs them.

use serde::Serialize;
use std::sync::Arc;

use crate::binding::{BindingStore, ProductId};
use crate::cart::CartStore;
use crate::checkout::success_location;
use crate::config::GatewayConfig;
use crate::error::{PaymentError, Result};
use crate::notification::{Notification, ParsedNotification};
use crate::order::{GATEWAY, NewOrder, OrderId, OrderStatus, OrderStore, PaymentKey};
use crate::signature::{proof_token, verify_proof_token};

/// Where to send the buyer after a recorded purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SuccessRedirect {
    pub order_id: OrderId,
    pub payment_key: PaymentKey,
    pub product: ProductId,

    /// Success page URL with `payment_key` appended
    pub location: String,
}

/// Notification handler
pub struct NotificationHandler<B, O, C>
where
    B: BindingStore + ?Sized,
    O: OrderStore + ?Sized,
    C: CartStore + ?Sized,
{
    config: Arc<GatewayConfig>,
    bindings: Arc<B>,
    orders: Arc<O>,
    carts: Arc<C>,
}

impl<B, O, C> NotificationHandler<B, O, C>
where
    B: BindingStore + ?Sized,
    O: OrderStore + ?Sized,
    C: CartStore + ?Sized,
{
    pub fn new(config: Arc<GatewayConfig>, bindings: Arc<B>, orders: Arc<O>, carts: Arc<C>) -> Self {
        Self {
            config,
            bindings,
            orders,
            carts,
        }
    }

    /// Process a notification, swallowing every failure.
    ///
    /// Returns the redirect only when a new order was completed.
    pub fn handle(
        &self,
        notification: &Notification,
        cart_session: Option<&str>,
    ) -> Option<SuccessRedirect> {
        if notification.is_empty() {
            return None;
        }

        match self.process(notification, cart_session) {
            Ok(redirect) => Some(redirect),
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, code = e.code(), "ClickBank notification not recorded");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "ClickBank notification declined");
                None
            }
        }
    }

    /// Verify a notification and record its order
    pub fn process(
        &self,
        notification: &Notification,
        cart_session: Option<&str>,
    ) -> Result<SuccessRedirect> {
        let parsed = notification.parse()?;

        if !self.config.has_secret() {
            return Err(PaymentError::SecretNotConfigured);
        }

        tracing::debug!(
            item = %parsed.item,
            receipt = %parsed.receipt,
            time = parsed.time,
            "ClickBank notification received"
        );

        self.verify(&parsed)?;

        if let Some(holder) = self.orders.find_by_proof_token(&parsed.proof_token)? {
            return Err(PaymentError::ReplayedToken(holder));
        }

        let product = self
            .bindings
            .product_for(&parsed.item)?
            .ok_or_else(|| PaymentError::UnresolvedProduct(parsed.item.clone()))?;

        tracing::debug!(item = %parsed.item, product = %product, "Resolved ClickBank item");

        self.record(parsed, product, cart_session)
    }

    fn verify(&self, parsed: &ParsedNotification) -> Result<()> {
        let secret = &self.config.secret_key;

        let valid = verify_proof_token(
            secret,
            &parsed.receipt,
            parsed.time,
            &parsed.item,
            &parsed.proof_token,
        );

        if !valid {
            tracing::debug!(
                cbpop = %parsed.proof_token,
                expected = %proof_token(secret, &parsed.receipt, parsed.time, &parsed.item),
                "Proof token mismatch"
            );
            return Err(PaymentError::SignatureMismatch {
                receipt: parsed.receipt.clone(),
            });
        }

        Ok(())
    }

    fn record(
        &self,
        parsed: ParsedNotification,
        product: ProductId,
        cart_session: Option<&str>,
    ) -> Result<SuccessRedirect> {
        let order = self
            .orders
            .create(NewOrder {
                email: parsed.email,
                first_name: parsed.name.first,
                last_name: parsed.name.last,
                product,
                gateway: GATEWAY.to_string(),
            })
            .map_err(|e| PaymentError::OrderCreationFailed(e.to_string()))?;

        if order.id.0 == 0 {
            return Err(PaymentError::OrderCreationFailed("store returned order id 0".into()));
        }

        // The token must be attached before the order completes; a concurrent
        // duplicate that loses this race is left pending.
        self.orders.attach_proof_token(order.id, &parsed.proof_token)?;
        self.orders.set_status(order.id, OrderStatus::Complete)?;

        // Order is already complete: a cart failure is logged, not returned.
        if let Some(session) = cart_session {
            if let Err(e) = self.carts.empty(session) {
                tracing::warn!(
                    error = %e,
                    order_id = %order.id,
                    "Could not empty cart after purchase"
                );
            }
        }

        tracing::info!(
            order_id = %order.id,
            product = %product,
            email = %order.email,
            receipt = %parsed.receipt,
            "Recorded ClickBank purchase"
        );

        Ok(SuccessRedirect {
            order_id: order.id,
            location: success_location(&self.config.success_url, &order.key),
            payment_key: order.key,
            product,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::MemoryBindingStore;
    use crate::cart::MemoryCartStore;
    use crate::order::{MemoryOrderStore, Order};

    const PRODUCT: ProductId = ProductId(42);
    const TOKEN: &str = "6F505756";

    struct Fixture {
        handler: NotificationHandler<MemoryBindingStore, MemoryOrderStore, MemoryCartStore>,
        bindings: Arc<MemoryBindingStore>,
        orders: Arc<MemoryOrderStore>,
        carts: Arc<MemoryCartStore>,
    }

    fn fixture(secret: &str) -> Fixture {
        let config =
            GatewayConfig::new("vendor", secret, "https://shop.example.com/purchase-confirmation")
                .unwrap();
        let bindings = Arc::new(MemoryBindingStore::new());
        bindings.set_item(PRODUCT, Some("ABC123")).unwrap();
        let orders = Arc::new(MemoryOrderStore::new());
        let carts = Arc::new(MemoryCartStore::new());

        Fixture {
            handler: NotificationHandler::new(
                Arc::new(config),
                bindings.clone(),
                orders.clone(),
                carts.clone(),
            ),
            bindings,
            orders,
            carts,
        }
    }

    fn notification(token: &str) -> Notification {
        Notification {
            item: Some("ABC123".into()),
            cbreceipt: Some("R1".into()),
            time: Some("1700000000".into()),
            cbpop: Some(token.into()),
            cname: Some("Jane Public".into()),
            cemail: Some("jane@example.com".into()),
        }
    }

    fn only_order(orders: &MemoryOrderStore) -> Order {
        let all = orders.list().unwrap();
        assert_eq!(all.len(), 1);
        all.into_iter().next().unwrap()
    }

    #[test]
    fn test_end_to_end_purchase() {
        let fx = fixture("s3cr3t");
        fx.carts.add_item("sess-1", PRODUCT).unwrap();

        let redirect = fx.handler.handle(&notification(TOKEN), Some("sess-1")).unwrap();

        let order = only_order(&fx.orders);
        assert_eq!(order.email, "jane@example.com");
        assert_eq!(order.first_name, "Jane");
        assert_eq!(order.last_name, "Public");
        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(order.downloads, vec![PRODUCT]);
        assert_eq!(order.gateway, "ClickBank");
        assert_eq!(order.proof_token.as_deref(), Some(TOKEN));

        assert_eq!(redirect.order_id, order.id);
        assert_eq!(
            redirect.location,
            format!(
                "https://shop.example.com/purchase-confirmation?payment_key={}",
                order.key
            )
        );
        assert!(fx.carts.items("sess-1").unwrap().is_empty());
    }

    #[test]
    fn test_replay_is_noop() {
        let fx = fixture("s3cr3t");
        assert!(fx.handler.handle(&notification(TOKEN), None).is_some());
        let first = only_order(&fx.orders);

        assert!(fx.handler.handle(&notification(TOKEN), None).is_none());
        let err = fx.handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(err, PaymentError::ReplayedToken(id) if id == first.id));

        let after = only_order(&fx.orders);
        assert_eq!(after.status, OrderStatus::Complete);
        assert_eq!(after.completed_at, first.completed_at);
    }

    #[test]
    fn test_replay_checked_before_product_resolution() {
        let fx = fixture("s3cr3t");
        assert!(fx.handler.handle(&notification(TOKEN), None).is_some());
        let first = only_order(&fx.orders);

        fx.bindings.set_item(PRODUCT, None).unwrap();

        let err = fx.handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(err, PaymentError::ReplayedToken(id) if id == first.id));
        assert_eq!(fx.orders.count().unwrap(), 1);
    }

    #[test]
    fn test_wrong_token_rejected() {
        let fx = fixture("s3cr3t");
        let err = fx.handler.process(&notification("DEADBEEF"), None).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureMismatch { .. }));
        assert_eq!(fx.orders.count().unwrap(), 0);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let fx = fixture("not-the-secret");
        let err = fx.handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_lowercase_token_rejected() {
        let fx = fixture("s3cr3t");
        let err = fx.handler.process(&notification("6f505756"), None).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_secret_not_configured() {
        let fx = fixture("");
        let err = fx.handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(err, PaymentError::SecretNotConfigured));
    }

    #[test]
    fn test_missing_field_checked_first() {
        let fx = fixture("");
        let mut n = notification(TOKEN);
        n.cemail = None;
        let err = fx.handler.process(&n, None).unwrap_err();
        assert!(matches!(err, PaymentError::MissingField("cemail")));
    }

    #[test]
    fn test_unbound_item_rejected() {
        let config = GatewayConfig::new("vendor", "s3cr3t", "https://shop.example.com/").unwrap();
        let orders = Arc::new(MemoryOrderStore::new());
        let handler = NotificationHandler::new(
            Arc::new(config),
            Arc::new(MemoryBindingStore::new()),
            orders.clone(),
            Arc::new(MemoryCartStore::new()),
        );

        let err = handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(err, PaymentError::UnresolvedProduct(ref item) if item == "ABC123"));
        assert_eq!(orders.count().unwrap(), 0);
    }

    #[test]
    fn test_not_a_notification() {
        let fx = fixture("s3cr3t");
        assert!(fx.handler.handle(&Notification::default(), None).is_none());
    }

    struct FailingOrders;

    impl OrderStore for FailingOrders {
        fn create(&self, _: NewOrder) -> Result<Order> {
            Err(PaymentError::Storage("database unavailable".into()))
        }
        fn get(&self, _: OrderId) -> Result<Option<Order>> {
            Ok(None)
        }
        fn get_by_key(&self, _: &PaymentKey) -> Result<Option<Order>> {
            Ok(None)
        }
        fn find_by_proof_token(&self, _: &str) -> Result<Option<OrderId>> {
            Ok(None)
        }
        fn attach_proof_token(&self, _: OrderId, _: &str) -> Result<()> {
            panic!("token must not be attached when creation fails")
        }
        fn set_status(&self, _: OrderId, _: OrderStatus) -> Result<()> {
            panic!("status must not change when creation fails")
        }
        fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_order_creation_failure() {
        let config = GatewayConfig::new("vendor", "s3cr3t", "https://shop.example.com/").unwrap();
        let bindings = Arc::new(MemoryBindingStore::new());
        bindings.set_item(PRODUCT, Some("ABC123")).unwrap();
        let handler = NotificationHandler::new(
            Arc::new(config),
            bindings,
            Arc::new(FailingOrders),
            Arc::new(MemoryCartStore::new()),
        );

        let err = handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(err, PaymentError::OrderCreationFailed(_)));
        assert!(handler.handle(&notification(TOKEN), None).is_none());
    }

    fn bound_bindings() -> Arc<MemoryBindingStore> {
        let bindings = Arc::new(MemoryBindingStore::new());
        bindings.set_item(PRODUCT, Some("ABC123")).unwrap();
        bindings
    }

    fn config() -> Arc<GatewayConfig> {
        Arc::new(GatewayConfig::new("vendor", "s3cr3t", "https://shop.example.com/").unwrap())
    }

    /// Hands back id 0 from `create`; nothing may be written afterwards.
    #[derive(Default)]
    struct ZeroIdOrders {
        inner: MemoryOrderStore,
    }

    impl OrderStore for ZeroIdOrders {
        fn create(&self, new: NewOrder) -> Result<Order> {
            let mut order = self.inner.create(new)?;
            order.id = OrderId(0);
            Ok(order)
        }
        fn get(&self, id: OrderId) -> Result<Option<Order>> {
            self.inner.get(id)
        }
        fn get_by_key(&self, key: &PaymentKey) -> Result<Option<Order>> {
            self.inner.get_by_key(key)
        }
        fn find_by_proof_token(&self, token: &str) -> Result<Option<OrderId>> {
            self.inner.find_by_proof_token(token)
        }
        fn attach_proof_token(&self, _: OrderId, _: &str) -> Result<()> {
            panic!("token must not be attached to order 0")
        }
        fn set_status(&self, _: OrderId, _: OrderStatus) -> Result<()> {
            panic!("order 0 must not be completed")
        }
        fn count(&self) -> Result<usize> {
            self.inner.count()
        }
    }

    #[test]
    fn test_zero_order_id_rejected() {
        let orders = Arc::new(ZeroIdOrders::default());
        let carts = Arc::new(MemoryCartStore::new());
        carts.add_item("sess-1", PRODUCT).unwrap();
        let handler =
            NotificationHandler::new(config(), bound_bindings(), orders.clone(), carts.clone());

        let err = handler.process(&notification(TOKEN), Some("sess-1")).unwrap_err();
        assert!(matches!(err, PaymentError::OrderCreationFailed(_)));

        let stored = only_order(&orders.inner);
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.proof_token, None);
        assert_eq!(orders.find_by_proof_token(TOKEN).unwrap(), None);
        assert_eq!(carts.items("sess-1").unwrap(), vec![PRODUCT]);
    }

    /// Never sees an existing token, as if two deliveries raced past the
    /// replay check.
    #[derive(Default)]
    struct StaleReplayCheck {
        inner: MemoryOrderStore,
    }

    impl OrderStore for StaleReplayCheck {
        fn create(&self, new: NewOrder) -> Result<Order> {
            self.inner.create(new)
        }
        fn get(&self, id: OrderId) -> Result<Option<Order>> {
            self.inner.get(id)
        }
        fn get_by_key(&self, key: &PaymentKey) -> Result<Option<Order>> {
            self.inner.get_by_key(key)
        }
        fn find_by_proof_token(&self, _: &str) -> Result<Option<OrderId>> {
            Ok(None)
        }
        fn attach_proof_token(&self, id: OrderId, token: &str) -> Result<()> {
            self.inner.attach_proof_token(id, token)
        }
        fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<()> {
            self.inner.set_status(id, status)
        }
        fn count(&self) -> Result<usize> {
            self.inner.count()
        }
    }

    #[test]
    fn test_race_loser_stays_pending() {
        let orders = Arc::new(StaleReplayCheck::default());
        let handler = NotificationHandler::new(
            config(),
            bound_bindings(),
            orders.clone(),
            Arc::new(MemoryCartStore::new()),
        );

        let first = handler.process(&notification(TOKEN), None).unwrap();
        assert_eq!(first.order_id, OrderId(1));

        let second = handler.process(&notification(TOKEN), None).unwrap_err();
        assert!(matches!(second, PaymentError::ReplayedToken(OrderId(1))));
        assert!(handler.handle(&notification(TOKEN), None).is_none());

        let statuses: Vec<_> = orders.inner.list().unwrap().iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Complete, OrderStatus::Pending, OrderStatus::Pending]
        );
        assert_eq!(orders.inner.find_by_proof_token(TOKEN).unwrap(), Some(OrderId(1)));
    }

    struct FailingCarts;

    impl CartStore for FailingCarts {
        fn add_item(&self, _: &str, _: ProductId) -> Result<()> {
            Ok(())
        }
        fn items(&self, _: &str) -> Result<Vec<ProductId>> {
            Ok(Vec::new())
        }
        fn empty(&self, _: &str) -> Result<()> {
            Err(PaymentError::Storage("session backend unavailable".into()))
        }
    }

    #[test]
    fn test_cart_failure_still_redirects() {
        let orders = Arc::new(MemoryOrderStore::new());
        let handler = NotificationHandler::new(
            config(),
            bound_bindings(),
            orders.clone(),
            Arc::new(FailingCarts),
        );

        let redirect = handler.handle(&notification(TOKEN), Some("sess-1")).unwrap();

        let order = only_order(&orders);
        assert_eq!(order.status, OrderStatus::Complete);
        assert_eq!(redirect.payment_key, order.key);
        assert!(redirect.location.ends_with(&format!("payment_key={}", order.key)));
    }
}
