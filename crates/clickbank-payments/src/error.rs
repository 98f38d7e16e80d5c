//! Payment Error Types

use thiserror::Error;

use crate::binding::ProductId;
use crate::order::OrderId;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// A required notification field is absent or empty
    #[error("Notification field missing: {0}")]
    MissingField(&'static str),

    /// A notification field is present but malformed
    #[error("Notification field invalid: {field} = {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// No secret key configured, so nothing can be verified
    #[error("ClickBank secret key not configured")]
    SecretNotConfigured,

    /// Proof token (cbpop) did not match the expected digest
    #[error("Proof token mismatch for receipt {receipt}")]
    SignatureMismatch { receipt: String },

    /// Proof token already authorized an order
    #[error("Proof token already used by order {0}")]
    ReplayedToken(OrderId),

    /// Item code is not bound to any product
    #[error("No product bound to item code: {0}")]
    UnresolvedProduct(String),

    /// The order store could not create the order
    #[error("Order creation failed: {0}")]
    OrderCreationFailed(String),

    /// Item code is already bound to another product
    #[error("Item code {item} already bound to product {owner}")]
    ItemAlreadyBound { item: String, owner: ProductId },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::OrderCreationFailed(_) | PaymentError::Storage(_))
    }

    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::MissingField(_) => "MISSING_FIELD",
            PaymentError::InvalidField { .. } => "INVALID_FIELD",
            PaymentError::SecretNotConfigured => "SECRET_NOT_CONFIGURED",
            PaymentError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            PaymentError::ReplayedToken(_) => "REPLAYED_TOKEN",
            PaymentError::UnresolvedProduct(_) => "UNRESOLVED_PRODUCT",
            PaymentError::OrderCreationFailed(_) => "ORDER_CREATION_FAILED",
            PaymentError::ItemAlreadyBound { .. } => "ITEM_ALREADY_BOUND",
            PaymentError::Config(_) => "CONFIG_ERROR",
            PaymentError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::ItemAlreadyBound { .. } => {
                "That ClickBank item is already assigned to another product."
            }
            PaymentError::Config(_) | PaymentError::SecretNotConfigured => {
                "Service configuration error."
            }
            PaymentError::InvalidField { field: "item", .. } => {
                "ClickBank item codes may only contain letters and digits."
            }
            PaymentError::Storage(_) => "Storage is temporarily unavailable. Please try again.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for PaymentError {
    fn from(err: std::io::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}
