//! Payment Gateway Integration
//!
//! Abstraction over the external checkout processor. The engine only ever
//! talks to `PaymentGateway`; the concrete client is injected at
//! construction time, never reached through ambient globals.

mod mercado_pago;
mod mock;

pub use mercado_pago::{MercadoPagoConfig, MercadoPagoGateway};
pub use mock::MockGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Request to open a hosted checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreferenceRequest {
    /// Item title shown on the checkout page
    pub title: String,

    /// Amount to charge, in CLP
    pub amount: i64,

    /// Our session id, echoed back by the gateway as `external_reference`
    pub external_reference: String,
}

/// Hosted checkout created by the gateway
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutPreference {
    /// Gateway-side preference id
    pub preference_id: String,

    /// Production checkout URL
    pub init_point: String,

    /// Sandbox checkout URL
    pub sandbox_init_point: String,
}

/// Gateway-reported payment status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Approved,
    Pending,
    Rejected,
}

/// A payment as the gateway reports it during verification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayPayment {
    /// Gateway transaction id
    pub payment_id: String,

    pub status: GatewayPaymentStatus,

    /// Amount the gateway says was paid, in CLP
    pub amount: i64,

    /// Our session id, as echoed back
    pub external_reference: String,
}

/// Payment gateway client trait
///
/// Implement this per processor; `MockGateway` covers tests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout for the given amount
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<CheckoutPreference>;

    /// Fetch the payment recorded against our session id, if any
    async fn fetch_payment(&self, external_reference: &str) -> Result<Option<GatewayPayment>>;

    /// Public key for the client-side checkout widget
    fn public_key(&self) -> &str;

    /// Gateway name for logs
    fn name(&self) -> &str;
}
