//! MercadoPago Gateway Client
//!
//! Talks to the Checkout Pro preference API over HTTPS. Network errors,
//! timeouts, and 5xx responses surface as `GatewayUnavailable` so the
//! caller can retry; 4xx responses are not retryable.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{
    CheckoutPreference, GatewayPayment, GatewayPaymentStatus, PaymentGateway, PreferenceRequest,
};
use crate::error::{EntitlementError, Result};

const DEFAULT_BASE_URL: &str = "https://api.mercadopago.com";

/// Gateway calls must not hang a request handler; cap at 12s.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// MercadoPago client configuration
#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub public_key: String,
    pub base_url: String,
}

impl MercadoPagoConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("MP_ACCESS_TOKEN")
            .map_err(|_| EntitlementError::Config("MP_ACCESS_TOKEN not set".into()))?;
        let public_key = std::env::var("MP_PUBLIC_KEY")
            .map_err(|_| EntitlementError::Config("MP_PUBLIC_KEY not set".into()))?;
        let base_url =
            std::env::var("MP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        Ok(Self {
            access_token,
            public_key,
            base_url,
        })
    }
}

/// MercadoPago gateway client
pub struct MercadoPagoGateway {
    client: reqwest::Client,
    config: MercadoPagoConfig,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    sandbox_init_point: String,
}

#[derive(Deserialize)]
struct PaymentSearchResponse {
    results: Vec<PaymentResult>,
}

#[derive(Deserialize)]
struct PaymentResult {
    id: u64,
    status: String,
    transaction_amount: f64,
    external_reference: Option<String>,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EntitlementError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    fn parse_status(status: &str) -> GatewayPaymentStatus {
        match status {
            "approved" => GatewayPaymentStatus::Approved,
            "pending" | "in_process" | "authorized" => GatewayPaymentStatus::Pending,
            _ => GatewayPaymentStatus::Rejected,
        }
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<CheckoutPreference> {
        let body = serde_json::json!({
            "items": [{
                "title": request.title,
                "quantity": 1,
                "currency_id": "CLP",
                "unit_price": request.amount,
            }],
            "external_reference": request.external_reference,
        });

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.config.base_url))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(EntitlementError::GatewayUnavailable(format!(
                "preference creation returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(EntitlementError::Config(format!(
                "preference creation rejected: {}",
                response.status()
            )));
        }

        let preference: PreferenceResponse = response.json().await?;

        Ok(CheckoutPreference {
            preference_id: preference.id,
            init_point: preference.init_point,
            sandbox_init_point: preference.sandbox_init_point,
        })
    }

    async fn fetch_payment(&self, external_reference: &str) -> Result<Option<GatewayPayment>> {
        let response = self
            .client
            .get(format!("{}/v1/payments/search", self.config.base_url))
            .bearer_auth(&self.config.access_token)
            .query(&[("external_reference", external_reference)])
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(EntitlementError::GatewayUnavailable(format!(
                "payment search returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(EntitlementError::Config(format!(
                "payment search rejected: {}",
                response.status()
            )));
        }

        let search: PaymentSearchResponse = response.json().await?;

        Ok(search.results.into_iter().next().map(|p| GatewayPayment {
            payment_id: p.id.to_string(),
            status: Self::parse_status(&p.status),
            // CLP has no fractional unit; truncation is safe here
            amount: p.transaction_amount as i64,
            external_reference: p.external_reference.unwrap_or_default(),
        }))
    }

    fn public_key(&self) -> &str {
        &self.config.public_key
    }

    fn name(&self) -> &str {
        "mercadopago"
    }
}
