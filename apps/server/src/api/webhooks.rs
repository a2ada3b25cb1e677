//! Provider webhook endpoint. Authenticated by the provider's signature, not by a caller token.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use northstar_core::webhooks::VERIFICATION_HEADER;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::main_lib::AppState;

const WEBHOOK_ID_HEADER: &str = "plaid-webhook-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/plaid/webhook", post(receive_webhook))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Delivery id used for de-duplication; deliveries without one are never de-duplicated.
fn idempotency_key(headers: &HeaderMap) -> String {
    header_value(headers, WEBHOOK_ID_HEADER)
        .or_else(|| header_value(headers, REQUEST_ID_HEADER))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn reply(status: StatusCode, error: Option<&str>) -> Response {
    let body = match error {
        Some(error) => json!({ "ok": false, "error": error }),
        None => json!({ "ok": true }),
    };
    (status, Json(body)).into_response()
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = header_value(&headers, VERIFICATION_HEADER);
    if let Err(err) = state.webhook_verifier.verify(&body, token).await {
        if err.is_unauthenticated() {
            warn!("[Webhook] Rejected delivery: {}", err);
            return reply(StatusCode::UNAUTHORIZED, Some("unauthorized"));
        }
        error!("[Webhook] Cannot verify delivery right now: {}", err);
        return reply(StatusCode::SERVICE_UNAVAILABLE, Some("unavailable"));
    }

    let key = idempotency_key(&headers);
    match state.webhook_ingestion.ingest(&body, &key).await {
        Ok(outcome) => {
            info!(
                "[Webhook] Delivery {} {:?} (sync triggered: {})",
                key, outcome.status, outcome.sync_triggered
            );
            reply(StatusCode::OK, None)
        }
        Err(err) => {
            error!("[Webhook] Failed to ingest delivery {}: {}", key, err);
            reply(StatusCode::INTERNAL_SERVER_ERROR, Some("internal"))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::api::test_support::{
        sign_webhook, spawn_app, verification_key_body, OTHER_SIGNING_KEY_PEM,
        SIGNING_KEY_PEM,
    };

    fn delivery(body: &str, token: Option<&str>, webhook_id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/plaid/webhook")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(VERIFICATION_HEADER, token);
        }
        if let Some(webhook_id) = webhook_id {
            builder = builder.header(WEBHOOK_ID_HEADER, webhook_id);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[test]
    fn idempotency_key_prefers_webhook_id_then_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-1"));
        assert_eq!(idempotency_key(&headers), "req-1");

        headers.insert(WEBHOOK_ID_HEADER, HeaderValue::from_static("hook-1"));
        assert_eq!(idempotency_key(&headers), "hook-1");

        let generated = idempotency_key(&HeaderMap::new());
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_ne!(generated, idempotency_key(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let app = spawn_app().await;

        let (status, body) = app
            .send(delivery(r#"{"webhook_type":"TRANSACTIONS"}"#, None, Some("d-1")))
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "ok": false, "error": "unauthorized" }));
    }

    #[tokio::test]
    async fn key_lookup_outage_is_unavailable() {
        let mut app = spawn_app().await;
        let key_mock = app
            .plaid
            .mock("POST", "/webhook_verification_key/get")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let payload = r#"{"webhook_type":"TRANSACTIONS","webhook_code":"SYNC_UPDATES_AVAILABLE"}"#;
        let token = sign_webhook(payload.as_bytes(), Utc::now().timestamp(), SIGNING_KEY_PEM);
        let (status, body) = app.send(delivery(payload, Some(&token), Some("d-1"))).await;

        key_mock.assert_async().await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({ "ok": false, "error": "unavailable" }));
    }

    #[tokio::test]
    async fn accepts_signed_delivery_once_per_webhook_id() {
        let mut app = spawn_app().await;
        let key_mock = app
            .plaid
            .mock("POST", "/webhook_verification_key/get")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(verification_key_body())
            .expect(1)
            .create_async()
            .await;

        let payload = r#"{"webhook_type":"ITEM","webhook_code":"WEBHOOK_UPDATE_ACKNOWLEDGED","item_id":"unknown-item"}"#;
        let token = sign_webhook(payload.as_bytes(), Utc::now().timestamp(), SIGNING_KEY_PEM);

        let (first, first_body) = app.send(delivery(payload, Some(&token), Some("d-1"))).await;
        let (second, second_body) = app.send(delivery(payload, Some(&token), Some("d-1"))).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(first_body, json!({ "ok": true }));
        assert_eq!(second, StatusCode::OK);
        assert_eq!(second_body, json!({ "ok": true }));
        // Second verification is served from the key cache.
        key_mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejects_token_signed_by_another_key() {
        let mut app = spawn_app().await;
        let _key_mock = app
            .plaid
            .mock("POST", "/webhook_verification_key/get")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(verification_key_body())
            .create_async()
            .await;

        let payload = r#"{"webhook_type":"TRANSACTIONS"}"#;
        let token = sign_webhook(
            payload.as_bytes(),
            Utc::now().timestamp(),
            OTHER_SIGNING_KEY_PEM,
        );
        let (status, body) = app.send(delivery(payload, Some(&token), None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let mut app = spawn_app().await;
        let _key_mock = app
            .plaid
            .mock("POST", "/webhook_verification_key/get")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(verification_key_body())
            .create_async()
            .await;

        let token = sign_webhook(
            br#"{"webhook_type":"TRANSACTIONS"}"#,
            Utc::now().timestamp(),
            SIGNING_KEY_PEM,
        );
        let (status, _) = app
            .send(delivery(r#"{"webhook_type":"ITEM"}"#, Some(&token), None))
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
