//! Checkout Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout-related errors
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Webhook arrived without a signature header
    #[error("Missing webhook signature")]
    MissingSignature,

    /// Webhook signature did not match the payload
    #[error("Webhook signature invalid")]
    InvalidSignature,

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    Payload(String),

    /// Configuration error (e.g. webhook secret not set)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CheckoutError {
    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            CheckoutError::MissingSignature => "Missing signature",
            CheckoutError::InvalidSignature => "Invalid signature",
            CheckoutError::Config(_) => "Configuration error",
            _ => "Internal server error",
        }
    }
}
