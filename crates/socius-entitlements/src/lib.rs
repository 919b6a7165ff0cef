//! # socius-entitlements
//!
//! Payment-gated entitlement engine for the socius association platform.
//!
//! An *entitlement* is a member's durable right to a resource: paid access
//! to a course, or the settlement of one monthly due ("cuota"). Both follow
//! the same flow:
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │  initiate   │────▶│  Hosted Checkout  │────▶│  reconcile  │
//! │  (price is  │     │  (MercadoPago)    │     │  (verify +  │
//! │  recomputed)│     │                   │     │   grant)    │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//! ```
//!
//! The browser comes back with `?pago={success|pending|failure}`, and the
//! gateway additionally posts a signed webhook; both paths run the same
//! reconciliation. Staff can also record bank-transfer or cash payments
//! directly.
//!
//! The single correctness mechanism is `EntitlementStore::grant_if_absent`:
//! an atomic insert-if-absent keyed by (principal, resource). Every write
//! path funnels through it, so duplicate tabs, retried fetches, replayed
//! webhooks, and manual/gateway races can never double-grant.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socius_entitlements::{EntitlementEngine, Resource, ReturnStatus};
//!
//! let handle = engine.initiate(&principal, Resource::Course(1)).await?;
//! // Redirect user to: handle.init_point
//!
//! // On return from checkout:
//! let outcome = engine.reconcile(&principal, Resource::Course(1), ReturnStatus::Success).await?;
//! ```

mod catalog;
mod engine;
mod entitlement;
mod error;
mod gateway;
mod resource;
mod session;
mod webhook;

pub use catalog::{Catalog, Course, DueRecord, MemoryCatalog};
pub use engine::{CheckoutHandle, EntitlementEngine, ReconcileOutcome, ReturnStatus};
pub use entitlement::{
    Entitlement, EntitlementStatus, EntitlementStore, GrantOutcome, MemoryEntitlementStore,
    PaymentMethod,
};
pub use error::{EntitlementError, Result};
pub use gateway::{
    CheckoutPreference, GatewayPayment, GatewayPaymentStatus, MercadoPagoConfig,
    MercadoPagoGateway, MockGateway, PaymentGateway, PreferenceRequest,
};
pub use resource::{DuePeriod, PrincipalId, Resource};
pub use session::{MemorySessionStore, PaymentSession, SessionStore};
pub use webhook::{WebhookDisposition, WebhookNotification, WebhookReceiver};
