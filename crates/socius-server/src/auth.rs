//! Request Authentication Context
//!
//! Session handling itself lives in the upstream auth layer; by the time a
//! request reaches this service, that layer has placed the caller's identity
//! in `x-usuario-id` and role in `x-rol`. Here we only read those headers
//! and enforce role checks.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use socius_entitlements::PrincipalId;

use crate::handlers::ErrorResponse;

/// Caller role as asserted by the auth layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Member,
    Staff,
}

/// Authenticated caller
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub principal: PrincipalId,
    pub role: Role,
}

impl AuthContext {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// May this caller act on records belonging to `principal`?
    pub fn can_act_for(&self, principal: &PrincipalId) -> bool {
        self.is_staff() || &self.principal == principal
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .headers
            .get("x-usuario-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(PrincipalId::new)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "Not authenticated".into(),
                        code: "UNAUTHENTICATED".into(),
                    }),
                )
            })?;

        let role = match parts.headers.get("x-rol").and_then(|v| v.to_str().ok()) {
            Some("admin" | "staff") => Role::Staff,
            _ => Role::Member,
        };

        Ok(AuthContext { principal, role })
    }
}
