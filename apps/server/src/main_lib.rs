//! Service wiring shared by the binary and the router tests.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use northstar_core::connections::{ConnectionService, ConnectionServiceTrait};
use northstar_core::secrets::CredentialVault;
use northstar_core::sync::{SyncEngine, SyncEngineTrait};
use northstar_core::webhooks::{
    CachedVerificationKeySource, WebhookIngestionService, WebhookIngestionServiceTrait,
    WebhookVerifier,
};
use northstar_plaid::PlaidClient;
use northstar_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, ItemRepository, LedgerRepository,
    RetryQueueRepository, SyncRunRepository, WebhookEventRepository,
};
use tracing::info;

use crate::api;
use crate::auth::BearerAuth;
use crate::config::ServerConfig;

pub struct AppState {
    pub connection_service: Arc<dyn ConnectionServiceTrait>,
    pub sync_engine: Arc<dyn SyncEngineTrait>,
    pub webhook_verifier: Arc<WebhookVerifier>,
    pub webhook_ingestion: Arc<dyn WebhookIngestionServiceTrait>,
    pub retry_queue: Arc<RetryQueueRepository>,
    pub auth: Arc<BearerAuth>,
}

/// Opens storage, builds the provider client and wires every service.
///
/// Fails when the vault key is missing or malformed so the server never starts
/// without the ability to read stored credentials.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let vault = Arc::new(
        CredentialVault::new(&config.token_encryption_key)
            .context("TOKEN_ENCRYPTION_KEY is not a usable vault key")?,
    );

    let db_path = init(&config.data_dir).context("Failed to prepare data directory")?;
    run_migrations(&db_path).context("Failed to run database migrations")?;
    let pool = create_pool(&db_path).context("Failed to open database pool")?;
    let writer = spawn_writer(pool.as_ref().clone());
    info!("[Server] Database ready at {}", db_path);

    let item_repository = Arc::new(ItemRepository::new(pool.clone(), writer.clone()));
    let sync_run_repository = Arc::new(SyncRunRepository::new(pool.clone(), writer.clone()));
    let ledger_repository = Arc::new(LedgerRepository::new(pool.clone(), writer.clone()));
    let webhook_repository = Arc::new(WebhookEventRepository::new(pool.clone(), writer.clone()));
    let retry_queue = Arc::new(RetryQueueRepository::new(pool, writer));

    let plaid = Arc::new(PlaidClient::new(config.plaid.clone()).context("Invalid Plaid config")?);
    info!(
        "[Server] Plaid client targeting {} ({})",
        config.plaid.resolved_base_url(),
        config.plaid.environment
    );

    let sync_engine: Arc<dyn SyncEngineTrait> = Arc::new(SyncEngine::new(
        item_repository.clone(),
        sync_run_repository,
        ledger_repository,
        plaid.clone(),
        vault.clone(),
        retry_queue.clone(),
    ));

    let connection_service = Arc::new(ConnectionService::new(
        item_repository.clone(),
        plaid.clone(),
        vault,
        sync_engine.clone(),
    ));
    let webhook_verifier = Arc::new(WebhookVerifier::new(Arc::new(
        CachedVerificationKeySource::new(plaid),
    )));
    let webhook_ingestion = Arc::new(WebhookIngestionService::new(
        webhook_repository,
        item_repository,
        sync_engine.clone(),
        retry_queue.clone(),
    ));

    Ok(Arc::new(AppState {
        connection_service,
        sync_engine,
        webhook_verifier,
        webhook_ingestion,
        retry_queue,
        auth: Arc::new(BearerAuth::new(&config.auth_secret)),
    }))
}

pub fn app_router(state: Arc<AppState>) -> Router {
    api::router().with_state(state)
}
