//! Entitlement Records and Storage
//!
//! The entitlement store is the single source of truth for "who may access
//! what". Both the reconciler and the manual settlement path write through
//! `grant_if_absent`, so the at-most-one-Active invariant is enforced in one
//! place, atomically, instead of by callers checking first and writing later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{EntitlementError, Result};
use crate::resource::{PrincipalId, Resource};

/// Entitlement lifecycle status
///
/// Only Active records are ever persisted: pending and rejected checkouts
/// are reported to the caller without a stored row, so a later attempt
/// starts from a clean slate. The full set exists on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementStatus {
    Pending,
    Active,
    Rejected,
}

/// How an entitlement was paid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Gateway,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Gateway => "gateway",
            PaymentMethod::BankTransfer => "transferencia",
            PaymentMethod::Cash => "efectivo",
        }
    }

    /// Parse the REST-layer `metodoPago` value
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gateway" | "mercadopago" => Some(PaymentMethod::Gateway),
            "transferencia" | "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "efectivo" | "cash" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

/// One principal's right to one resource
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entitlement {
    /// Who holds the entitlement
    pub principal: PrincipalId,

    /// What it grants
    pub resource: Resource,

    /// Lifecycle status
    pub status: EntitlementStatus,

    /// Amount actually paid, in CLP
    pub amount_paid: i64,

    /// ISO currency code
    pub currency: String,

    /// How it was paid
    pub payment_method: PaymentMethod,

    /// Gateway transaction id, or free-text manual reference
    pub payment_reference: String,

    /// Set when the entitlement becomes Active
    pub granted_at: Option<DateTime<Utc>>,
}

impl Entitlement {
    /// Create an Active entitlement, stamped now
    pub fn active(
        principal: PrincipalId,
        resource: Resource,
        amount_paid: i64,
        payment_method: PaymentMethod,
        payment_reference: impl Into<String>,
    ) -> Self {
        Self {
            principal,
            resource,
            status: EntitlementStatus::Active,
            amount_paid,
            currency: "CLP".into(),
            payment_method,
            payment_reference: payment_reference.into(),
            granted_at: Some(Utc::now()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EntitlementStatus::Active
    }
}

/// Result of an insert-if-absent grant
#[derive(Clone, Debug)]
pub enum GrantOutcome {
    /// This call created the Active record
    Inserted(Entitlement),

    /// An Active record already existed; returned unchanged
    Existing(Entitlement),
}

impl GrantOutcome {
    pub fn entitlement(&self) -> &Entitlement {
        match self {
            GrantOutcome::Inserted(e) | GrantOutcome::Existing(e) => e,
        }
    }
}

/// Entitlement storage trait
pub trait EntitlementStore: Send + Sync {
    /// Insert an Active entitlement unless one already exists for the same
    /// (principal, resource). Must be atomic: concurrent callers see exactly
    /// one `Inserted` and the rest `Existing` with the winner's record.
    fn grant_if_absent(&self, entitlement: Entitlement) -> Result<GrantOutcome>;

    /// Get the Active entitlement for a principal/resource, if any
    fn get_active(&self, principal: &PrincipalId, resource: &Resource)
        -> Result<Option<Entitlement>>;

    /// All Active entitlements held by a principal
    fn list(&self, principal: &PrincipalId) -> Result<Vec<Entitlement>>;
}

/// In-memory entitlement store (for development and tests)
pub struct MemoryEntitlementStore {
    records: RwLock<HashMap<(PrincipalId, Resource), Entitlement>>,
}

impl Default for MemoryEntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl EntitlementStore for MemoryEntitlementStore {
    fn grant_if_absent(&self, entitlement: Entitlement) -> Result<GrantOutcome> {
        // Check and insert under one write guard; this is the memory-store
        // equivalent of a unique-constraint insert.
        let mut records = self
            .records
            .write()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        let key = (entitlement.principal.clone(), entitlement.resource);
        if let Some(existing) = records.get(&key) {
            if existing.is_active() {
                return Ok(GrantOutcome::Existing(existing.clone()));
            }
        }

        records.insert(key, entitlement.clone());
        Ok(GrantOutcome::Inserted(entitlement))
    }

    fn get_active(
        &self,
        principal: &PrincipalId,
        resource: &Resource,
    ) -> Result<Option<Entitlement>> {
        let records = self
            .records
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        Ok(records
            .get(&(principal.clone(), *resource))
            .filter(|e| e.is_active())
            .cloned())
    }

    fn list(&self, principal: &PrincipalId) -> Result<Vec<Entitlement>> {
        let records = self
            .records
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        Ok(records
            .values()
            .filter(|e| &e.principal == principal && e.is_active())
            .cloned()
            .collect())
    }
}
