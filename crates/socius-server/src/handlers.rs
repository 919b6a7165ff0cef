//! HTTP Handlers
//!
//! The REST surface of the entitlement engine. Field names on the wire
//! follow the existing client contract (`montoPagado`, `metodoPago`,
//! `init_point`, ...), so the Spanish names are deliberate.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use socius_entitlements::{
    DueRecord, Entitlement, EntitlementError, PaymentMethod, PrincipalId, ReconcileOutcome,
    Resource, ReturnStatus,
};

use crate::auth::AuthContext;
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gateway: String,
}

/// `{ data: { init_point, sandbox_init_point } }` — the shape the client
/// expects from both checkout initiation endpoints.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub data: InitPoints,
}

#[derive(Debug, Serialize)]
pub struct InitPoints {
    pub init_point: String,
    pub sandbox_init_point: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCheckoutRequest {
    pub cuota_usuario_id: uuid::Uuid,
    /// Client-suggested amount; never trusted, the server reprices
    #[serde(default)]
    pub monto_pagado: Option<i64>,
    #[serde(default)]
    pub metodo_pago: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    /// `success`, `pending`, or `failure`, from the `?pago=` query parameter
    pub pago: String,
    #[serde(default)]
    pub curso: Option<u64>,
    #[serde(default)]
    pub cuota_usuario_id: Option<uuid::Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSettlementRequest {
    pub monto_pagado: i64,
    pub metodo_pago: String,
    pub referencia_pago: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGrantRequest {
    pub usuario_id: String,
    pub id_curso: u64,
    /// Payment method tag (`transferencia`, `efectivo`)
    pub tipo_acceso: String,
    pub precio_pagado: i64,
    pub referencia_pago: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub acceso: bool,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

// ============================================================================
// Error Mapping
// ============================================================================

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Map engine errors onto the client contract: 400 for already-settled and
/// invalid state, 401/403 for auth, 5xx only for retryable outages.
fn error_response(err: &EntitlementError) -> HandlerError {
    let (status, code) = match err {
        EntitlementError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
        EntitlementError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        EntitlementError::AlreadySettled(_) => (StatusCode::BAD_REQUEST, "ALREADY_SETTLED"),
        EntitlementError::ResourceNotPurchasable(_) => {
            (StatusCode::BAD_REQUEST, "NOT_PURCHASABLE")
        }
        EntitlementError::InvalidMethod(_) => (StatusCode::BAD_REQUEST, "INVALID_METHOD"),
        EntitlementError::SessionNotFound(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
        EntitlementError::VerificationFailed { .. } => {
            (StatusCode::CONFLICT, "VERIFICATION_FAILED")
        }
        EntitlementError::WebhookSignature(_) => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        EntitlementError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
        EntitlementError::GatewayUnavailable(_) => {
            (StatusCode::BAD_GATEWAY, "GATEWAY_UNAVAILABLE")
        }
        EntitlementError::Storage(_) | EntitlementError::Config(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message().into(),
            code: code.into(),
        }),
    )
}

fn bad_request(message: &str, code: &str) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

fn forbidden() -> HandlerError {
    error_response(&EntitlementError::Forbidden("not allowed".into()))
}

fn resolve_due(state: &AppState, id: uuid::Uuid) -> Result<DueRecord, HandlerError> {
    state
        .engine
        .catalog()
        .due(id)
        .map_err(|e| error_response(&e))?
        .ok_or_else(|| bad_request("Cuota not found", "NOT_PURCHASABLE"))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gateway: state.engine.gateway().name().into(),
    })
}

/// `POST /detalles-cursos/{id}/pago` — open a checkout for a course
pub async fn course_checkout(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<u64>,
) -> Result<Json<CheckoutResponse>, HandlerError> {
    let handle = state
        .engine
        .initiate(&auth.principal, Resource::Course(id))
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(CheckoutResponse {
        data: InitPoints {
            init_point: handle.init_point,
            sandbox_init_point: handle.sandbox_init_point,
        },
    }))
}

/// `POST /payments/iniciar` — open a checkout for a monthly due
pub async fn due_checkout(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<DueCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, HandlerError> {
    // This endpoint is gateway-only; transfers and cash go through the
    // manual settlement route.
    if let Some(method) = payload.metodo_pago.as_deref() {
        if PaymentMethod::parse(method) != Some(PaymentMethod::Gateway) {
            return Err(bad_request(
                "Only gateway payments start a checkout",
                "INVALID_METHOD",
            ));
        }
    }

    let due = resolve_due(&state, payload.cuota_usuario_id)?;
    if !auth.can_act_for(&due.principal) {
        return Err(forbidden());
    }

    // The due's own amount is what gets charged, never the client's number.
    if let Some(suggested) = payload.monto_pagado {
        if suggested != due.amount {
            tracing::debug!(
                cuota = %due.id,
                suggested,
                amount = due.amount,
                "Ignoring client-suggested amount; due is repriced server-side"
            );
        }
    }

    let handle = state
        .engine
        .initiate(&due.principal, Resource::MonthlyDue(due.period))
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(CheckoutResponse {
        data: InitPoints {
            init_point: handle.init_point,
            sandbox_init_point: handle.sandbox_init_point,
        },
    }))
}

/// `POST /payments/retorno` — reconcile after the browser returns from
/// checkout with `?pago={success|pending|failure}`
pub async fn payment_return(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<ReturnRequest>,
) -> Result<Json<ReconcileOutcome>, HandlerError> {
    let status = ReturnStatus::parse(&payload.pago)
        .ok_or_else(|| bad_request("Unknown pago status", "INVALID_STATE"))?;

    let (principal, resource) = match (payload.curso, payload.cuota_usuario_id) {
        (Some(curso), None) => (auth.principal.clone(), Resource::Course(curso)),
        (None, Some(cuota_id)) => {
            let due = resolve_due(&state, cuota_id)?;
            if !auth.can_act_for(&due.principal) {
                return Err(forbidden());
            }
            (due.principal, Resource::MonthlyDue(due.period))
        }
        _ => {
            return Err(bad_request(
                "Exactly one of curso or cuotaUsuarioId is required",
                "INVALID_STATE",
            ))
        }
    };

    let outcome = state
        .engine
        .reconcile(&principal, resource, status)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(outcome))
}

/// `POST /cuotas/{cuotaUsuarioId}/pagos` — record a manual due settlement
pub async fn settle_due(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(cuota_usuario_id): Path<uuid::Uuid>,
    Json(payload): Json<DueSettlementRequest>,
) -> Result<Json<Entitlement>, HandlerError> {
    let due = resolve_due(&state, cuota_usuario_id)?;
    if !auth.can_act_for(&due.principal) {
        return Err(forbidden());
    }

    let method = PaymentMethod::parse(&payload.metodo_pago)
        .ok_or_else(|| bad_request("Unknown metodoPago", "INVALID_METHOD"))?;

    let entitlement = state
        .engine
        .settle_manually(
            &due.principal,
            Resource::MonthlyDue(due.period),
            payload.monto_pagado,
            method,
            payload.referencia_pago,
        )
        .map_err(|e| error_response(&e))?;

    Ok(Json(entitlement))
}

/// `POST /detalles-cursos/acceso/otorgar` — staff grants course access for
/// an out-of-band payment. Returns 400, never 500, when access exists.
pub async fn grant_course_access(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CourseGrantRequest>,
) -> Result<Json<Entitlement>, HandlerError> {
    if !auth.is_staff() {
        return Err(forbidden());
    }

    let method = PaymentMethod::parse(&payload.tipo_acceso)
        .ok_or_else(|| bad_request("Unknown tipoAcceso", "INVALID_METHOD"))?;

    let entitlement = state
        .engine
        .settle_manually(
            &PrincipalId::new(payload.usuario_id),
            Resource::Course(payload.id_curso),
            payload.precio_pagado,
            method,
            payload.referencia_pago,
        )
        .map_err(|e| error_response(&e))?;

    Ok(Json(entitlement))
}

/// `GET /detalles-cursos/{id}/acceso` — gate for course content delivery
pub async fn course_access(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<u64>,
) -> Result<Json<AccessResponse>, HandlerError> {
    let acceso = state
        .engine
        .has_access(&auth.principal, &Resource::Course(id))
        .map_err(|e| error_response(&e))?;

    Ok(Json(AccessResponse { acceso }))
}

/// `GET /usuarios/{id}/accesos` — dashboard list of a user's entitlements
pub async fn list_access(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<Vec<Entitlement>>, HandlerError> {
    let principal = PrincipalId::new(id);
    if !auth.can_act_for(&principal) {
        return Err(forbidden());
    }

    let entitlements = state
        .engine
        .list_entitlements(&principal)
        .map_err(|e| error_response(&e))?;

    Ok(Json(entitlements))
}

/// `GET /payments/public-key` — key for the client-side checkout widget
pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.engine.gateway().public_key().into(),
    })
}

/// `POST /webhook/pagos` — signed gateway notification
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, HandlerError> {
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| bad_request("Missing signature", "MISSING_SIGNATURE"))?;

    state
        .webhook
        .handle(&body, signature)
        .await
        .map_err(|e| {
            tracing::warn!("Webhook rejected: {}", e);
            error_response(&e)
        })?;

    Ok(StatusCode::OK)
}
