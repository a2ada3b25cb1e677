//! Connection endpoints: link, exchange, manual sync, retries and health.
//!
//! Every handler runs as the authenticated caller; items owned by someone else
//! read as not found.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use northstar_core::connections::{LinkedConnection, RetryRunReport};
use northstar_core::items::ConnectionHealth;
use northstar_core::provider::LinkToken;
use northstar_core::sync::SyncSummary;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::main_lib::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest {
    #[serde(default)]
    public_token: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/connections/link-token", post(create_link_token))
        .route("/connections/exchange", post(exchange_public_token))
        .route("/connections/items/:item_id/sync", post(sync_item))
        .route("/connections/retries/run", post(run_due_retries))
        .route("/connections/health", get(list_connection_health))
}

async fn create_link_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<LinkToken>> {
    debug!("[Connections] Creating link token for {}", user.user_id);
    let token = state
        .connection_service
        .create_link_token(&user.user_id)
        .await?;
    Ok(Json(token))
}

async fn exchange_public_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ExchangeRequest>,
) -> ApiResult<Json<LinkedConnection>> {
    let linked = state
        .connection_service
        .exchange_public_token_and_sync(&user.user_id, &request.public_token)
        .await?;
    info!(
        "[Connections] User {} linked item {} ({} added)",
        user.user_id, linked.item_id, linked.sync_summary.added_count
    );
    Ok(Json(linked))
}

async fn sync_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(item_id): Path<String>,
) -> ApiResult<Json<SyncSummary>> {
    let summary = state
        .connection_service
        .run_sync_for_item(&user.user_id, &item_id)
        .await?;
    Ok(Json(summary))
}

async fn run_due_retries(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<RetryRunReport>> {
    let report = state
        .connection_service
        .run_due_retries(&user.user_id)
        .await?;
    if report.tried_count > 0 {
        info!(
            "[Connections] Retried {} item(s) for {}, {} succeeded",
            report.tried_count, user.user_id, report.success_count
        );
    }
    Ok(Json(report))
}

async fn list_connection_health(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<ConnectionHealth>>> {
    Ok(Json(
        state
            .connection_service
            .list_connection_health(&user.user_id)?,
    ))
}
