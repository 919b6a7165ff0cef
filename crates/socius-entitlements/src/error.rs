//! Entitlement Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, EntitlementError>;

/// Entitlement and payment errors
#[derive(Error, Debug)]
pub enum EntitlementError {
    /// Caller is not authenticated
    #[error("Not authenticated")]
    Unauthenticated,

    /// Caller is authenticated but not allowed to perform this operation
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Resource cannot be purchased (already owned, not for sale, due settled)
    #[error("Resource not purchasable: {0}")]
    ResourceNotPurchasable(String),

    /// An Active entitlement already exists for this principal/resource
    #[error("Already settled: {0}")]
    AlreadySettled(String),

    /// Gateway-reported payment does not match the session (tamper guard)
    #[error("Payment verification failed: expected {expected}, gateway reported {reported}")]
    VerificationFailed { expected: i64, reported: i64 },

    /// No open payment session matches this principal/resource
    #[error("Payment session not found: {0}")]
    SessionNotFound(String),

    /// Manual settlement with a method only the gateway path may use
    #[error("Payment method not accepted here: {0}")]
    InvalidMethod(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Gateway network error, timeout, or 5xx (retryable)
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EntitlementError {
    /// Check if this error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EntitlementError::GatewayUnavailable(_) | EntitlementError::Storage(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            EntitlementError::Unauthenticated => "Please sign in and try again.",
            EntitlementError::Forbidden(_) => "You are not allowed to perform this action.",
            EntitlementError::ResourceNotPurchasable(_) => "This item is not available for purchase.",
            EntitlementError::AlreadySettled(_) => "This item is already paid.",
            EntitlementError::VerificationFailed { .. } => "The payment could not be verified.",
            EntitlementError::GatewayUnavailable(_) => {
                "Payment processing is temporarily unavailable. Please try again."
            }
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<reqwest::Error> for EntitlementError {
    fn from(err: reqwest::Error) -> Self {
        EntitlementError::GatewayUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_are_retryable() {
        assert!(EntitlementError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(!EntitlementError::AlreadySettled("curso 1".into()).is_retryable());
        assert!(!EntitlementError::VerificationFailed { expected: 10, reported: 20 }.is_retryable());
    }
}
