//! Gateway Configuration
//!
//! Settings are injected into the processor and checkout objects; nothing
//! reads them from global state.

use std::path::PathBuf;

use reqwest::Url;

use crate::error::{PaymentError, Result};

/// ClickBank gateway configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// ClickBank vendor account nickname (used in order form URLs)
    pub account_nickname: String,

    /// Secret key shared with ClickBank for cbpop verification
    pub secret_key: String,

    /// Where buyers land after a verified purchase
    pub success_url: Url,

    /// Token required on the admin binding API (None = API disabled)
    pub admin_token: Option<String>,

    /// JSON file holding product bindings (None = in-memory)
    pub bindings_path: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn new(
        account_nickname: impl Into<String>,
        secret_key: impl Into<String>,
        success_url: &str,
    ) -> Result<Self> {
        let success_url = Url::parse(success_url)
            .map_err(|e| PaymentError::Config(format!("invalid success URL {success_url:?}: {e}")))?;

        Ok(Self {
            account_nickname: account_nickname.into().trim().to_string(),
            secret_key: secret_key.into().trim().to_string(),
            success_url,
            admin_token: None,
            bindings_path: None,
        })
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let success_url = std::env::var("CLICKBANK_SUCCESS_URL")
            .map_err(|_| PaymentError::Config("CLICKBANK_SUCCESS_URL not set".into()))?;
        let nickname = std::env::var("CLICKBANK_ACCOUNT_NICKNAME").unwrap_or_default();
        let secret = std::env::var("CLICKBANK_SECRET_KEY").unwrap_or_default();

        let mut config = Self::new(nickname, secret, &success_url)?;
        config.admin_token = std::env::var("CLICKBANK_ADMIN_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        config.bindings_path = std::env::var("CLICKBANK_BINDINGS_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    /// Whether notifications can be verified
    pub fn has_secret(&self) -> bool {
        !self.secret_key.is_empty()
    }

    /// Both settings present; required for the checkout redirect
    pub fn is_active(&self) -> bool {
        !self.account_nickname.is_empty() && self.has_secret()
    }
}
