//! Gateway Webhook Receiver
//!
//! Server-to-server payment notifications. The return URL alone loses a
//! payment whenever the user closes the tab before coming back, so the
//! gateway also posts here; the notification funnels into the same
//! idempotent reconciliation as the browser return.
//!
//! Authentication is an HMAC-SHA256 of the raw body, hex-encoded in the
//! `x-signature` header.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::engine::{EntitlementEngine, ReconcileOutcome};
use crate::error::{EntitlementError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Parsed gateway notification
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookNotification {
    /// Notification type; only "payment" is acted on
    #[serde(rename = "type")]
    pub kind: String,

    pub data: WebhookData,
}

/// Notification payload body
#[derive(Clone, Debug, Deserialize)]
pub struct WebhookData {
    /// Our session id, echoed back as the external reference
    pub external_reference: String,
}

/// What the receiver did with a notification
#[derive(Clone, Debug)]
pub enum WebhookDisposition {
    /// Payment notification reconciled
    Reconciled(ReconcileOutcome),

    /// Notification type we do not handle
    Ignored { kind: String },
}

/// Webhook receiver: verifies, parses, and reconciles
pub struct WebhookReceiver {
    engine: EntitlementEngine,
    secret: String,
}

impl WebhookReceiver {
    pub fn new(engine: EntitlementEngine, secret: impl Into<String>) -> Self {
        Self {
            engine,
            secret: secret.into(),
        }
    }

    /// Verify the HMAC signature over the raw payload
    pub fn verify_signature(&self, payload: &[u8], signature_hex: &str) -> Result<()> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| EntitlementError::Config(e.to_string()))?;
        mac.update(payload);

        let signature = hex::decode(signature_hex)
            .map_err(|_| EntitlementError::WebhookSignature("signature is not hex".into()))?;

        mac.verify_slice(&signature)
            .map_err(|_| EntitlementError::WebhookSignature("signature mismatch".into()))
    }

    /// Verify and process one notification
    pub async fn handle(&self, payload: &str, signature_hex: &str) -> Result<WebhookDisposition> {
        self.verify_signature(payload.as_bytes(), signature_hex)?;

        let notification: WebhookNotification = serde_json::from_str(payload)
            .map_err(|e| EntitlementError::WebhookParse(e.to_string()))?;

        if notification.kind != "payment" {
            tracing::debug!(kind = %notification.kind, "Ignoring webhook notification");
            return Ok(WebhookDisposition::Ignored {
                kind: notification.kind,
            });
        }

        tracing::info!(
            external_reference = %notification.data.external_reference,
            "Processing payment webhook"
        );

        let outcome = self
            .engine
            .reconcile_session(&notification.data.external_reference)
            .await?;

        Ok(WebhookDisposition::Reconciled(outcome))
    }
}
