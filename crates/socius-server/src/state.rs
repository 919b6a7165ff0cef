//! Application State

use std::sync::Arc;

use socius_entitlements::{EntitlementEngine, WebhookReceiver};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The entitlement engine (stores, catalog, and gateway injected at build)
    pub engine: EntitlementEngine,

    /// Webhook receiver sharing the same engine
    pub webhook: Arc<WebhookReceiver>,
}
