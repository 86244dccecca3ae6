//! HTTP Handlers

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use checkout_core::{CheckoutError, EmailAddress, PurchaseStore, WebhookHandler};

use crate::state::AppState;

/// Signature header the payment provider sends with every webhook
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub webhook_configured: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub email: String,
    pub payment_link_id: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub registered: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ============================================================================
// Router
// ============================================================================

/// API routes shared by the binary and the handler tests
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/check-payment-status", post(payment_status))
        .route("/api/webhook", post(payment_webhook))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        webhook_configured: state.webhook_secret.is_some(),
    })
}

/// Registration/status endpoint.
///
/// With `action == "register"` it records the buyer's intent to purchase;
/// otherwise it answers whether the purchase this caller tracks has
/// completed. The body is deserialized in-handler so a malformed request
/// maps to a plain 500 rather than an extractor rejection.
pub async fn payment_status(State(state): State<AppState>, body: String) -> Response {
    let request: StatusRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Malformed payment-status request");
            return internal_error();
        }
    };

    let email = EmailAddress::normalize(&request.email);

    if request.action.as_deref() == Some("register") {
        match state.store.register(&email, &request.payment_link_id) {
            Ok(_) => {
                tracing::info!(
                    email = %email,
                    payment_link_id = %request.payment_link_id,
                    "Registered pending purchase"
                );
                Json(RegisterResponse { registered: true }).into_response()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register pending purchase");
                internal_error()
            }
        }
    } else {
        match state.store.status(&email, &request.payment_link_id) {
            Ok(status) => {
                tracing::debug!(
                    email = %email,
                    payment_link_id = %request.payment_link_id,
                    success = status.success,
                    is_pending = status.is_pending,
                    should_show_success = status.should_show_success,
                    "Payment status check"
                );
                Json(status).into_response()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to check payment status");
                internal_error()
            }
        }
    }
}

/// Payment webhook receiver.
///
/// Once the signature verifies, the response is always `{ received: true }`
/// whether or not the event matched a pending purchase, so the provider is
/// never prompted to retry a legitimately unmatched or duplicate delivery.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Webhook rejected: missing signature header");
        return error_response(StatusCode::UNAUTHORIZED, "Missing signature");
    };

    let Some(secret) = state.webhook_secret.as_deref() else {
        tracing::error!("Webhook secret not configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Configuration error");
    };

    let handler = WebhookHandler::new(state.store.clone(), state.notifier.clone());

    let payload = match handler.parse_event(&body, signature, secret) {
        Ok(payload) => payload,
        Err(CheckoutError::InvalidSignature) => {
            tracing::warn!("Webhook rejected: invalid signature");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid signature");
        }
        Err(e) => {
            tracing::error!(error = %e, "Webhook error");
            return internal_error();
        }
    };

    if let Err(e) = handler.handle(payload).await {
        // Still acknowledge: a provider retry cannot fix a local fault, and
        // an error response would only trigger redundant re-deliveries.
        tracing::error!(error = %e, "Error processing payment");
    }

    Json(WebhookAck { received: true }).into_response()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use checkout_core::{LogNotifier, MemoryPurchaseStore};
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use sha2::Sha256;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "test-webhook-secret";

    fn test_state(secret: Option<&str>) -> AppState {
        AppState {
            store: Arc::new(MemoryPurchaseStore::new()),
            notifier: Arc::new(LogNotifier),
            webhook_secret: secret.map(String::from),
        }
    }

    fn sign(secret: &str, to_address: &str, amount: f64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{to_address}{amount}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn webhook_body(link: &str, email: &str, status: &str, amount: f64) -> String {
        serde_json::json!({
            "paymentLinkID": link,
            "paymentID": "pay_1",
            "fromAddress": "0xfrom",
            "toAddress": "0xto",
            "hash": "0xabc",
            "network": "BASE",
            "token": "USDC",
            "amount": amount,
            "status": status,
            "createdAt": "2024-06-01T12:00:00Z",
            "updatedAt": "2024-06-01T12:01:00Z",
            "Payer_Email": email
        })
        .to_string()
    }

    async fn send_json(app: Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    async fn send_webhook(
        app: Router,
        body: String,
        signature: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            request = request.header(SIGNATURE_HEADER, sig);
        }
        let response = app
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    fn register_body(email: &str, link: &str) -> String {
        serde_json::json!({
            "email": email,
            "paymentLinkId": link,
            "action": "register"
        })
        .to_string()
    }

    fn status_body(email: &str, link: &str) -> String {
        serde_json::json!({
            "email": email,
            "paymentLinkId": link
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state(Some(SECRET)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_then_status_pending() {
        let state = test_state(Some(SECRET));

        let (status, json) = send_json(
            router(state.clone()),
            "/api/check-payment-status",
            register_body("a@x.com", "L1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "registered": true }));

        let (status, json) = send_json(
            router(state),
            "/api/check-payment-status",
            status_body("a@x.com", "L1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "isPending": true,
                "shouldShowSuccess": false
            })
        );
    }

    #[tokio::test]
    async fn test_status_without_registration() {
        let (status, json) = send_json(
            router(test_state(Some(SECRET))),
            "/api/check-payment-status",
            status_body("nobody@x.com", "L1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["isPending"], serde_json::json!(false));
        assert_eq!(json["shouldShowSuccess"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_malformed_status_body() {
        let (status, json) = send_json(
            router(test_state(Some(SECRET))),
            "/api/check-payment-status",
            "{not json".into(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, serde_json::json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_webhook_missing_signature() {
        let body = webhook_body("L1", "a@x.com", "COMPLETED", 100.0);
        let (status, json) = send_webhook(router(test_state(Some(SECRET))), body, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json, serde_json::json!({ "error": "Missing signature" }));
    }

    #[tokio::test]
    async fn test_webhook_secret_not_configured() {
        let body = webhook_body("L1", "a@x.com", "COMPLETED", 100.0);
        let sig = sign(SECRET, "0xto", 100.0);
        let (status, json) = send_webhook(router(test_state(None)), body, Some(&sig)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, serde_json::json!({ "error": "Configuration error" }));
    }

    #[tokio::test]
    async fn test_webhook_invalid_signature() {
        let state = test_state(Some(SECRET));
        let body = webhook_body("L1", "a@x.com", "COMPLETED", 100.0);
        let sig = sign("some-other-secret", "0xto", 100.0);
        let (status, json) = send_webhook(router(state.clone()), body, Some(&sig)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json, serde_json::json!({ "error": "Invalid signature" }));

        // Rejected webhooks never mutate completion state.
        let (_, json) = send_json(
            router(state),
            "/api/check-payment-status",
            status_body("a@x.com", "L1"),
        )
        .await;
        assert_eq!(json["success"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_webhook_malformed_body() {
        let sig = sign(SECRET, "0xto", 100.0);
        let (status, json) =
            send_webhook(router(test_state(Some(SECRET))), "{broken".into(), Some(&sig)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json, serde_json::json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_full_purchase_flow() {
        let state = test_state(Some(SECRET));

        // Buyer registers intent, then pays on the hosted page.
        send_json(
            router(state.clone()),
            "/api/check-payment-status",
            register_body("a@x.com", "L1"),
        )
        .await;

        // Provider webhook arrives with a differently-cased payer email.
        let body = webhook_body("L1", "A@X.com", "COMPLETED", 100.0);
        let sig = sign(SECRET, "0xto", 100.0);
        let (status, json) = send_webhook(router(state.clone()), body, Some(&sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "received": true }));

        let (_, json) = send_json(
            router(state),
            "/api/check-payment-status",
            status_body("a@x.com", "L1"),
        )
        .await;
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "isPending": true,
                "shouldShowSuccess": true
            })
        );
    }

    #[tokio::test]
    async fn test_webhook_link_mismatch_does_not_show_success() {
        let state = test_state(Some(SECRET));

        send_json(
            router(state.clone()),
            "/api/check-payment-status",
            register_body("b@x.com", "L1"),
        )
        .await;

        let body = webhook_body("L2", "b@x.com", "COMPLETED", 100.0);
        let sig = sign(SECRET, "0xto", 100.0);
        let (status, _) = send_webhook(router(state.clone()), body, Some(&sig)).await;
        // Unmatched events are still acknowledged.
        assert_eq!(status, StatusCode::OK);

        let (_, json) = send_json(
            router(state),
            "/api/check-payment-status",
            status_body("b@x.com", "L1"),
        )
        .await;
        assert_eq!(json["shouldShowSuccess"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_webhook_redelivery_notifies_once() {
        let state = test_state(Some(SECRET));

        send_json(
            router(state.clone()),
            "/api/check-payment-status",
            register_body("c@x.com", "L1"),
        )
        .await;

        let body = webhook_body("L1", "c@x.com", "COMPLETED", 100.0);
        let sig = sign(SECRET, "0xto", 100.0);
        send_webhook(router(state.clone()), body.clone(), Some(&sig)).await;

        let email = EmailAddress::normalize("c@x.com");
        assert!(state.store.was_notified(&email).unwrap());

        // Provider re-delivers the same event; still acknowledged, still one send.
        let (status, json) = send_webhook(router(state.clone()), body, Some(&sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "received": true }));
        assert!(state.store.was_notified(&email).unwrap());
    }
}
