//! ClickBank Checkout Redirects
//!
//! Forward leg: send the buyer to the ClickBank order form for a bound item.
//! Return leg: build the success page URL carrying the order's access key.

use reqwest::Url;
use std::sync::Arc;

use crate::binding::{BindingStore, ProductId};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::order::PaymentKey;

/// Query parameter carrying the order access key
pub const PAYMENT_KEY_PARAM: &str = "payment_key";

/// ClickBank order form URL (`http://ITEM.VENDOR.pay.clickbank.net/`)
pub fn order_form_url(item: &str, account_nickname: &str) -> String {
    format!("http://{item}.{account_nickname}.pay.clickbank.net/")
}

/// Success URL with `payment_key` set, replacing any existing value
pub fn success_location(base: &Url, key: &PaymentKey) -> String {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(name, _)| name != PAYMENT_KEY_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    url.set_query(None);
    url.query_pairs_mut()
        .extend_pairs(kept)
        .append_pair(PAYMENT_KEY_PARAM, key.as_str());

    url.to_string()
}

/// Forward-leg redirect builder
pub struct ClickBankCheckout<B: BindingStore + ?Sized> {
    config: Arc<GatewayConfig>,
    bindings: Arc<B>,
}

impl<B: BindingStore + ?Sized> ClickBankCheckout<B> {
    pub fn new(config: Arc<GatewayConfig>, bindings: Arc<B>) -> Self {
        Self { config, bindings }
    }

    /// Order form URL for a product, if it is bound and the gateway is configured
    pub fn purchase_url(&self, product: ProductId) -> Result<Option<String>> {
        if !self.config.is_active() {
            tracing::debug!(product = %product, "ClickBank checkout not configured");
            return Ok(None);
        }

        let url = self
            .bindings
            .item_for(product)?
            .map(|item| order_form_url(&item, &self.config.account_nickname));

        if let Some(ref url) = url {
            tracing::info!(product = %product, url = %url, "Redirecting to ClickBank order form");
        }

        Ok(url)
    }
}
