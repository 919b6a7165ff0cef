//! Router Assembly

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    course_access, course_checkout, due_checkout, grant_course_access, health_check, list_access,
    payment_return, payment_webhook, public_key, settle_due,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Course purchase
        .route("/detalles-cursos/{id}/pago", post(course_checkout))
        .route("/detalles-cursos/{id}/acceso", get(course_access))
        .route("/detalles-cursos/acceso/otorgar", post(grant_course_access))
        // Dues
        .route("/payments/iniciar", post(due_checkout))
        .route("/cuotas/{cuota_usuario_id}/pagos", post(settle_due))
        // Shared payment surface
        .route("/payments/retorno", post(payment_return))
        .route("/payments/public-key", get(public_key))
        .route("/webhook/pagos", post(payment_webhook))
        // Dashboards
        .route("/usuarios/{id}/accesos", get(list_access))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use std::sync::Arc;
    use tower::ServiceExt;

    use socius_entitlements::{
        Course, DueRecord, DuePeriod, EntitlementEngine, GatewayPaymentStatus, MemoryCatalog,
        MemoryEntitlementStore, MemorySessionStore, MockGateway, PrincipalId, WebhookReceiver,
    };

    const WEBHOOK_SECRET: &str = "whsec_test";

    struct TestApp {
        router: Router,
        gateway: Arc<MockGateway>,
        due_id: uuid::Uuid,
    }

    fn test_app() -> TestApp {
        let gateway = Arc::new(MockGateway::new());
        let catalog = Arc::new(MemoryCatalog::new());

        catalog.insert_course(Course {
            id: 1,
            title: "Antropometría básica".into(),
            price: 10_000,
            discount_percent: 0,
            for_sale: true,
        });

        let due_id = uuid::Uuid::new_v4();
        catalog.insert_due(DueRecord {
            id: due_id,
            principal: PrincipalId::new("nutri-1"),
            period: DuePeriod::new(2025, 6),
            amount: 8_000,
        });

        let engine = EntitlementEngine::new(
            Arc::new(MemoryEntitlementStore::new()),
            Arc::new(MemorySessionStore::new()),
            catalog,
            gateway.clone(),
        );
        let webhook = Arc::new(WebhookReceiver::new(engine.clone(), WEBHOOK_SECRET));

        TestApp {
            router: router(AppState { engine, webhook }),
            gateway,
            due_id,
        }
    }

    fn request(method: Method, uri: &str, user: Option<(&str, &str)>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            builder = builder.header("x-usuario-id", id).header("x-rol", role);
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_course_checkout_requires_auth() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                "/detalles-cursos/1/pago",
                None,
                Some(serde_json::json!({})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_course_checkout_returns_init_points() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                "/detalles-cursos/1/pago",
                Some(("u1", "socio")),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["data"]["init_point"].as_str().unwrap().starts_with("https://"));
        assert!(json["data"]["sandbox_init_point"].is_string());
    }

    #[tokio::test]
    async fn test_duplicate_manual_grant_is_400_not_500() {
        let app = test_app();
        let grant = serde_json::json!({
            "usuarioId": "u1",
            "idCurso": 1,
            "tipoAcceso": "transferencia",
            "precioPagado": 10_000,
            "referenciaPago": "TRANSFER-55",
        });

        let first = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/detalles-cursos/acceso/otorgar",
                Some(("admin-1", "admin")),
                Some(grant.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .router
            .oneshot(request(
                Method::POST,
                "/detalles-cursos/acceso/otorgar",
                Some(("admin-1", "admin")),
                Some(grant),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        let json = body_json(second).await;
        assert_eq!(json["code"], "ALREADY_SETTLED");
    }

    #[tokio::test]
    async fn test_manual_grant_requires_staff() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                "/detalles-cursos/acceso/otorgar",
                Some(("u1", "socio")),
                Some(serde_json::json!({
                    "usuarioId": "u1",
                    "idCurso": 1,
                    "tipoAcceso": "efectivo",
                    "precioPagado": 0,
                    "referenciaPago": "x",
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_member_cannot_settle_anothers_due() {
        let app = test_app();

        let response = app
            .router
            .oneshot(request(
                Method::POST,
                &format!("/cuotas/{}/pagos", app.due_id),
                Some(("someone-else", "socio")),
                Some(serde_json::json!({
                    "montoPagado": 8_000,
                    "metodoPago": "transferencia",
                    "referenciaPago": "TRANSFER-1",
                })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_return_flow_grants_access() {
        let app = test_app();
        let user = Some(("u1", "socio"));

        let response = app
            .router
            .clone()
            .oneshot(request(Method::POST, "/detalles-cursos/1/pago", user, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The mock init_point embeds the session id.
        let json = body_json(response).await;
        let init_point = json["data"]["init_point"].as_str().unwrap().to_string();
        let session_id = init_point.rsplit('/').next().unwrap();
        app.gateway
            .record_payment(session_id, GatewayPaymentStatus::Approved, 10_000);

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/payments/retorno",
                user,
                Some(serde_json::json!({"pago": "success", "curso": 1})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["state"], "active");

        let response = app
            .router
            .oneshot(request(Method::GET, "/detalles-cursos/1/acceso", user, None))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["acceso"], true);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let app = test_app();
        let payload = r#"{"type":"payment","data":{"external_reference":"s1"}}"#;

        let response = app
            .router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhook/pagos")
                    .header("x-signature", "deadbeef")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_settles_due() {
        let app = test_app();
        let user = Some(("nutri-1", "socio"));

        let response = app
            .router
            .clone()
            .oneshot(request(
                Method::POST,
                "/payments/iniciar",
                user,
                Some(serde_json::json!({"cuotaUsuarioId": app.due_id})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let init_point = json["data"]["init_point"].as_str().unwrap().to_string();
        let session_id = init_point.rsplit('/').next().unwrap();
        app.gateway
            .record_payment(session_id, GatewayPaymentStatus::Approved, 8_000);

        let payload = format!(
            r#"{{"type":"payment","data":{{"external_reference":"{session_id}"}}}}"#
        );
        let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/webhook/pagos")
                    .header("x-signature", signature)
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .oneshot(request(Method::GET, "/usuarios/nutri-1/accesos", user, None))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}
