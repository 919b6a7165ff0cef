//! socius HTTP Server
//!
//! Axum-based REST API for the association platform's payment-gated
//! entitlements: course purchases, monthly dues, manual settlements.

mod app;
mod auth;
mod handlers;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socius_entitlements::{
    EntitlementEngine, MemoryCatalog, MemoryEntitlementStore, MemorySessionStore,
    MercadoPagoGateway, MockGateway, PaymentGateway, WebhookReceiver,
};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Payment gateway: real client when configured, mock otherwise so local
    // development still exercises the full flow.
    let gateway: Arc<dyn PaymentGateway> = match MercadoPagoGateway::from_env() {
        Ok(gateway) => {
            tracing::info!("✓ MercadoPago configured");
            Arc::new(gateway)
        }
        Err(e) => {
            tracing::warn!("⚠ MercadoPago not configured ({e}); using mock gateway");
            tracing::warn!("  Set MP_ACCESS_TOKEN and MP_PUBLIC_KEY in .env");
            Arc::new(MockGateway::new())
        }
    };

    let webhook_secret = std::env::var("WEBHOOK_SECRET").unwrap_or_else(|_| {
        tracing::warn!("⚠ WEBHOOK_SECRET not set; gateway notifications will be rejected");
        uuid::Uuid::new_v4().to_string()
    });

    // Stores and catalog. Memory-backed for now; the traits are the seam for
    // a database-backed deployment.
    let engine = EntitlementEngine::new(
        Arc::new(MemoryEntitlementStore::new()),
        Arc::new(MemorySessionStore::new()),
        Arc::new(MemoryCatalog::new()),
        gateway,
    );
    let webhook = Arc::new(WebhookReceiver::new(engine.clone(), webhook_secret));

    let app = app::router(AppState { engine, webhook });

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 socius server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                          - Health check");
    tracing::info!("  POST /detalles-cursos/{{id}}/pago       - Start course checkout");
    tracing::info!("  GET  /detalles-cursos/{{id}}/acceso     - Course access gate");
    tracing::info!("  POST /detalles-cursos/acceso/otorgar  - Manual course grant (staff)");
    tracing::info!("  POST /payments/iniciar                - Start due checkout");
    tracing::info!("  POST /payments/retorno                - Reconcile checkout return");
    tracing::info!("  GET  /payments/public-key             - Checkout widget key");
    tracing::info!("  POST /cuotas/{{id}}/pagos               - Manual due settlement");
    tracing::info!("  POST /webhook/pagos                   - Gateway notifications");
    tracing::info!("  GET  /usuarios/{{id}}/accesos           - Entitlement dashboard");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
