//! Entitlement Engine
//!
//! The five operations of the payment-gated entitlement flow: initiate a
//! checkout, reconcile the return from the gateway, settle out-of-band
//! payments, and answer access queries.
//!
//! Correctness rests on one mechanism: `EntitlementStore::grant_if_absent`.
//! Both the reconciler and the manual path write through it, so a duplicate
//! browser tab, a retried fetch, or a stale session racing a manual
//! settlement can never produce a second Active record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::entitlement::{
    Entitlement, EntitlementStore, GrantOutcome, PaymentMethod,
};
use crate::error::{EntitlementError, Result};
use crate::gateway::{GatewayPayment, GatewayPaymentStatus, PaymentGateway, PreferenceRequest};
use crate::resource::{PrincipalId, Resource};
use crate::session::{PaymentSession, SessionStore};

/// Status flag carried back on the return URL (`?pago=...`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus {
    Success,
    Pending,
    Failure,
}

impl ReturnStatus {
    /// Parse the raw query-string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ReturnStatus::Success),
            "pending" => Some(ReturnStatus::Pending),
            "failure" => Some(ReturnStatus::Failure),
            _ => None,
        }
    }
}

/// What the caller gets back from `initiate`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutHandle {
    pub session_id: String,
    pub init_point: String,
    pub sandbox_init_point: String,
}

/// What the caller gets back from `reconcile`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// Entitlement is Active (granted now, or already held)
    Active { entitlement: Entitlement },

    /// Payment still processing; nothing written, check back later
    Pending,

    /// Payment failed or failed verification; resource stays purchasable
    Rejected,
}

/// The entitlement engine
///
/// All collaborators are injected; clones share the same stores and gateway.
#[derive(Clone)]
pub struct EntitlementEngine {
    store: Arc<dyn EntitlementStore>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn Catalog>,
    gateway: Arc<dyn PaymentGateway>,
}

impl EntitlementEngine {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            sessions,
            catalog,
            gateway,
        }
    }

    pub fn gateway(&self) -> &dyn PaymentGateway {
        self.gateway.as_ref()
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Open a checkout session for a purchasable resource.
    ///
    /// The amount is always computed here from the catalog; any
    /// client-suggested price is ignored by the callers of this method.
    pub async fn initiate(
        &self,
        principal: &PrincipalId,
        resource: Resource,
    ) -> Result<CheckoutHandle> {
        if self.store.get_active(principal, &resource)?.is_some() {
            return Err(EntitlementError::ResourceNotPurchasable(format!(
                "{resource} already settled for {principal}"
            )));
        }

        let (title, amount) = match resource {
            Resource::Course(id) => {
                let course = self.catalog.course(id)?.ok_or_else(|| {
                    EntitlementError::ResourceNotPurchasable(format!("curso {id} does not exist"))
                })?;
                if !course.for_sale {
                    return Err(EntitlementError::ResourceNotPurchasable(format!(
                        "curso {id} is not for sale"
                    )));
                }
                (course.title.clone(), course.net_price())
            }
            Resource::MonthlyDue(period) => {
                let due = self.catalog.due_for(principal, period)?.ok_or_else(|| {
                    EntitlementError::ResourceNotPurchasable(format!(
                        "no outstanding cuota {period} for {principal}"
                    ))
                })?;
                (format!("Cuota {period}"), due.amount)
            }
        };

        let mut session = PaymentSession::new(principal.clone(), resource, amount, "", "");

        let preference = self
            .gateway
            .create_preference(&PreferenceRequest {
                title,
                amount,
                external_reference: session.session_id.clone(),
            })
            .await?;

        session.init_point = preference.init_point.clone();
        session.sandbox_init_point = preference.sandbox_init_point.clone();
        self.sessions.save(&session)?;

        tracing::info!(
            principal = %principal,
            resource = %resource,
            amount,
            session_id = %session.session_id,
            "Opened checkout session"
        );

        Ok(CheckoutHandle {
            session_id: session.session_id,
            init_point: preference.init_point,
            sandbox_init_point: preference.sandbox_init_point,
        })
    }

    /// Decide the entitlement state after the browser returns from checkout.
    ///
    /// Safe to call repeatedly and concurrently for the same
    /// principal/resource; at most one Active record can ever result.
    pub async fn reconcile(
        &self,
        principal: &PrincipalId,
        resource: Resource,
        status: ReturnStatus,
    ) -> Result<ReconcileOutcome> {
        match status {
            ReturnStatus::Pending => Ok(ReconcileOutcome::Pending),

            ReturnStatus::Failure => {
                if let Some(session) = self.sessions.find_open(principal, &resource)? {
                    self.sessions.consume(&session.session_id)?;
                }
                tracing::info!(
                    principal = %principal,
                    resource = %resource,
                    "Checkout reported failure; no entitlement created"
                );
                Ok(ReconcileOutcome::Rejected)
            }

            ReturnStatus::Success => self.reconcile_success(principal, resource).await,
        }
    }

    async fn reconcile_success(
        &self,
        principal: &PrincipalId,
        resource: Resource,
    ) -> Result<ReconcileOutcome> {
        // Idempotent short-circuit: a reloaded return page or a second tab
        // must see the same answer, with no gateway round-trip.
        if let Some(existing) = self.store.get_active(principal, &resource)? {
            tracing::info!(
                principal = %principal,
                resource = %resource,
                "Entitlement already active; reconcile is a no-op"
            );
            return Ok(ReconcileOutcome::Active {
                entitlement: existing,
            });
        }

        let Some(session) = self.sessions.find_open(principal, &resource)? else {
            // A concurrent reconcile may have consumed the session after our
            // first check; the grant happens before consumption, so look again.
            if let Some(existing) = self.store.get_active(principal, &resource)? {
                return Ok(ReconcileOutcome::Active {
                    entitlement: existing,
                });
            }
            return Err(EntitlementError::SessionNotFound(format!(
                "{principal}/{resource}"
            )));
        };

        let payment = self.gateway.fetch_payment(&session.session_id).await?;

        let Some(payment) = payment else {
            // Gateway has no record despite the success flag on the URL.
            tracing::warn!(
                principal = %principal,
                resource = %resource,
                session_id = %session.session_id,
                "Payment verification mismatch: success flag but no gateway record"
            );
            self.sessions.consume(&session.session_id)?;
            return Ok(ReconcileOutcome::Rejected);
        };

        match payment.status {
            GatewayPaymentStatus::Pending => Ok(ReconcileOutcome::Pending),

            GatewayPaymentStatus::Rejected => {
                self.sessions.consume(&session.session_id)?;
                tracing::info!(
                    principal = %principal,
                    resource = %resource,
                    payment_id = %payment.payment_id,
                    "Gateway rejected payment"
                );
                Ok(ReconcileOutcome::Rejected)
            }

            GatewayPaymentStatus::Approved => {
                // Tamper guard, not an ordinary failure path: the typed
                // error is absorbed into a Rejected outcome and never
                // surfaces as a success to the caller.
                if let Err(err) = Self::verify_payment(&session, &payment) {
                    tracing::warn!(
                        principal = %principal,
                        resource = %resource,
                        session_id = %session.session_id,
                        echoed_reference = %payment.external_reference,
                        error = %err,
                        "Payment verification mismatch: refusing to grant"
                    );
                    self.sessions.consume(&session.session_id)?;
                    return Ok(ReconcileOutcome::Rejected);
                }

                let entitlement = Entitlement::active(
                    principal.clone(),
                    resource,
                    payment.amount,
                    PaymentMethod::Gateway,
                    payment.payment_id.clone(),
                );

                let outcome = self.store.grant_if_absent(entitlement)?;
                self.sessions.consume(&session.session_id)?;

                // A concurrent reconcile may have won the insert; either way
                // the caller sees the one Active record.
                let entitlement = match outcome {
                    GrantOutcome::Inserted(e) => {
                        tracing::info!(
                            principal = %principal,
                            resource = %resource,
                            amount = e.amount_paid,
                            payment_id = %payment.payment_id,
                            "Granted entitlement"
                        );
                        e
                    }
                    GrantOutcome::Existing(e) => e,
                };

                Ok(ReconcileOutcome::Active { entitlement })
            }
        }
    }

    /// Check a gateway-reported payment against its session
    fn verify_payment(session: &PaymentSession, payment: &GatewayPayment) -> Result<()> {
        if payment.amount != session.expected_amount
            || payment.external_reference != session.session_id
        {
            return Err(EntitlementError::VerificationFailed {
                expected: session.expected_amount,
                reported: payment.amount,
            });
        }
        Ok(())
    }

    /// Reconcile by session id, for the webhook path.
    ///
    /// Runs the same success reconciliation as the return URL, so a
    /// notification that races the browser return still grants exactly once.
    pub async fn reconcile_session(&self, session_id: &str) -> Result<ReconcileOutcome> {
        let session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| EntitlementError::SessionNotFound(session_id.into()))?;

        self.reconcile(&session.principal, session.resource, ReturnStatus::Success)
            .await
    }

    /// Record an out-of-band payment (bank transfer, cash) as Active.
    ///
    /// Unlike the reconciler, a duplicate here is a real error: this path is
    /// not expected to race, so `AlreadySettled` surfaces to the caller.
    pub fn settle_manually(
        &self,
        principal: &PrincipalId,
        resource: Resource,
        amount_paid: i64,
        method: PaymentMethod,
        reference: impl Into<String>,
    ) -> Result<Entitlement> {
        if method == PaymentMethod::Gateway {
            return Err(EntitlementError::InvalidMethod(
                "gateway payments settle through reconciliation only".into(),
            ));
        }

        let entitlement = Entitlement::active(
            principal.clone(),
            resource,
            amount_paid,
            method,
            reference,
        );

        match self.store.grant_if_absent(entitlement)? {
            GrantOutcome::Inserted(e) => {
                tracing::info!(
                    principal = %principal,
                    resource = %resource,
                    amount = amount_paid,
                    method = method.as_str(),
                    "Recorded manual settlement"
                );
                Ok(e)
            }
            GrantOutcome::Existing(_) => Err(EntitlementError::AlreadySettled(format!(
                "{resource} already settled for {principal}"
            ))),
        }
    }

    /// Does this principal hold an Active entitlement for the resource?
    pub fn has_access(&self, principal: &PrincipalId, resource: &Resource) -> Result<bool> {
        Ok(self.store.get_active(principal, resource)?.is_some())
    }

    /// All Active entitlements for a principal, for dashboard views
    pub fn list_entitlements(&self, principal: &PrincipalId) -> Result<Vec<Entitlement>> {
        self.store.list(principal)
    }
}
