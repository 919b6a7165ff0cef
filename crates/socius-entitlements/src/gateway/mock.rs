//! Mock Payment Gateway
//!
//! For testing and demo purposes. Checkout preferences succeed with fake
//! URLs; verification answers are scripted per external reference.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{
    CheckoutPreference, GatewayPayment, GatewayPaymentStatus, PaymentGateway, PreferenceRequest,
};
use crate::error::{EntitlementError, Result};

/// Mock gateway with scripted verification results
pub struct MockGateway {
    payments: RwLock<HashMap<String, GatewayPayment>>,
    unavailable: RwLock<bool>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            payments: RwLock::new(HashMap::new()),
            unavailable: RwLock::new(false),
        }
    }

    /// Script what `fetch_payment` will report for a session
    pub fn record_payment(
        &self,
        external_reference: &str,
        status: GatewayPaymentStatus,
        amount: i64,
    ) {
        let payment = GatewayPayment {
            payment_id: format!("mock-pay-{external_reference}"),
            status,
            amount,
            external_reference: external_reference.to_string(),
        };
        self.payments
            .write()
            .unwrap()
            .insert(external_reference.to_string(), payment);
    }

    /// Make every call fail with `GatewayUnavailable`
    pub fn set_unavailable(&self, down: bool) {
        *self.unavailable.write().unwrap() = down;
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.read().unwrap() {
            return Err(EntitlementError::GatewayUnavailable("mock outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<CheckoutPreference> {
        self.check_available()?;

        Ok(CheckoutPreference {
            preference_id: format!("mock-pref-{}", request.external_reference),
            init_point: format!(
                "https://gateway.test/checkout/{}",
                request.external_reference
            ),
            sandbox_init_point: format!(
                "https://sandbox.gateway.test/checkout/{}",
                request.external_reference
            ),
        })
    }

    async fn fetch_payment(&self, external_reference: &str) -> Result<Option<GatewayPayment>> {
        self.check_available()?;

        Ok(self.payments.read().unwrap().get(external_reference).cloned())
    }

    fn public_key(&self) -> &str {
        "TEST-public-key"
    }

    fn name(&self) -> &str {
        "mock"
    }
}
