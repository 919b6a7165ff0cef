//! Payment Sessions
//!
//! A `PaymentSession` is an in-flight checkout against the external gateway.
//! It is created by the initiator, consumed exactly once by the reconciler,
//! and simply expires unconsumed if the user abandons checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{EntitlementError, Result};
use crate::resource::{PrincipalId, Resource};

/// An in-flight checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Our session id, also sent to the gateway as the external reference
    pub session_id: String,

    /// Who is paying
    pub principal: PrincipalId,

    /// What they are paying for
    pub resource: Resource,

    /// Server-computed amount the gateway must report back, in CLP
    pub expected_amount: i64,

    /// Production checkout URL
    pub init_point: String,

    /// Sandbox checkout URL
    pub sandbox_init_point: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set once the reconciler has closed this session
    pub consumed: bool,
}

impl PaymentSession {
    pub fn new(
        principal: PrincipalId,
        resource: Resource,
        expected_amount: i64,
        init_point: impl Into<String>,
        sandbox_init_point: impl Into<String>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            principal,
            resource,
            expected_amount,
            init_point: init_point.into(),
            sandbox_init_point: sandbox_init_point.into(),
            created_at: Utc::now(),
            consumed: false,
        }
    }
}

/// Payment session storage trait
pub trait SessionStore: Send + Sync {
    /// Persist a freshly created session
    fn save(&self, session: &PaymentSession) -> Result<()>;

    /// Look up a session by id, consumed or not
    fn get(&self, session_id: &str) -> Result<Option<PaymentSession>>;

    /// Latest open (unconsumed) session for a principal/resource
    fn find_open(&self, principal: &PrincipalId, resource: &Resource)
        -> Result<Option<PaymentSession>>;

    /// Mark a session consumed so it cannot be replayed
    fn consume(&self, session_id: &str) -> Result<()>;
}

/// In-memory session store (for development and tests)
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, PaymentSession>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &PaymentSession) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        Ok(sessions.get(session_id).cloned())
    }

    fn find_open(
        &self,
        principal: &PrincipalId,
        resource: &Resource,
    ) -> Result<Option<PaymentSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        Ok(sessions
            .values()
            .filter(|s| !s.consumed && &s.principal == principal && &s.resource == resource)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    fn consume(&self, session_id: &str) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;

        match sessions.get_mut(session_id) {
            Some(session) => {
                session.consumed = true;
                Ok(())
            }
            None => Err(EntitlementError::SessionNotFound(session_id.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumed_session_is_not_open() {
        let store = MemorySessionStore::new();
        let principal = PrincipalId::new("u1");
        let resource = Resource::Course(1);

        let session = PaymentSession::new(principal.clone(), resource, 10_000, "https://mp/init", "https://mp/sandbox");
        store.save(&session).unwrap();

        assert!(store.find_open(&principal, &resource).unwrap().is_some());

        store.consume(&session.session_id).unwrap();
        assert!(store.find_open(&principal, &resource).unwrap().is_none());
    }

    #[test]
    fn test_find_open_returns_latest() {
        let store = MemorySessionStore::new();
        let principal = PrincipalId::new("u1");
        let resource = Resource::Course(1);

        let older = PaymentSession::new(principal.clone(), resource, 10_000, "a", "b");
        store.save(&older).unwrap();

        let mut newer = PaymentSession::new(principal.clone(), resource, 12_000, "a", "b");
        newer.created_at = older.created_at + chrono::Duration::seconds(5);
        store.save(&newer).unwrap();

        let found = store.find_open(&principal, &resource).unwrap().unwrap();
        assert_eq!(found.session_id, newer.session_id);
    }
}
