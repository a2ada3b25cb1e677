//! Server configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use northstar_core::secrets::TOKEN_ENCRYPTION_KEY_ENV;
use northstar_plaid::{PlaidConfig, PlaidEnvironment};
use serde::Serialize;

const PLAID_CLIENT_ID_ENV: &str = "PLAID_CLIENT_ID";
const PLAID_SECRET_ENV: &str = "PLAID_SECRET";
const PLAID_ENV_ENV: &str = "PLAID_ENV";
const PLAID_BASE_URL_ENV: &str = "PLAID_BASE_URL";
const PLAID_REDIRECT_URI_ENV: &str = "PLAID_REDIRECT_URI";
const PLAID_WEBHOOK_URL_ENV: &str = "PLAID_WEBHOOK_URL";
const PLAID_CLIENT_NAME_ENV: &str = "PLAID_CLIENT_NAME";
const DATA_DIR_ENV: &str = "NORTHSTAR_DATA_DIR";
const LISTEN_ADDR_ENV: &str = "NORTHSTAR_LISTEN_ADDR";
const AUTH_SECRET_ENV: &str = "NORTHSTAR_AUTH_SECRET";
const RETRY_POLL_SECS_ENV: &str = "NORTHSTAR_RETRY_POLL_SECS";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8088";
const DEFAULT_RETRY_POLL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub plaid: PlaidConfig,
    pub token_encryption_key: String,
    pub data_dir: String,
    pub listen_addr: SocketAddr,
    pub auth_secret: String,
    pub retry_poll_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| var(name).with_context(|| format!("{} must be set", name));

        let mut plaid = PlaidConfig::new(required(PLAID_CLIENT_ID_ENV)?, required(PLAID_SECRET_ENV)?);
        if let Some(environment) = var(PLAID_ENV_ENV) {
            plaid.environment = environment
                .parse::<PlaidEnvironment>()
                .with_context(|| format!("Invalid {}", PLAID_ENV_ENV))?;
        }
        plaid.base_url = var(PLAID_BASE_URL_ENV);
        plaid.redirect_uri = var(PLAID_REDIRECT_URI_ENV);
        plaid.webhook_url = var(PLAID_WEBHOOK_URL_ENV);
        if let Some(client_name) = var(PLAID_CLIENT_NAME_ENV) {
            plaid.client_name = client_name;
        }

        let listen_addr = var(LISTEN_ADDR_ENV)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid {}", LISTEN_ADDR_ENV))?;

        let retry_poll_secs = match var(RETRY_POLL_SECS_ENV) {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid {}", RETRY_POLL_SECS_ENV))?,
            None => DEFAULT_RETRY_POLL_SECS,
        };
        if retry_poll_secs == 0 {
            bail!("{} must be greater than zero", RETRY_POLL_SECS_ENV);
        }

        Ok(Self {
            plaid,
            token_encryption_key: required(TOKEN_ENCRYPTION_KEY_ENV)?,
            data_dir: var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            listen_addr,
            auth_secret: required(AUTH_SECRET_ENV)?,
            retry_poll_interval: Duration::from_secs(retry_poll_secs),
        })
    }
}

/// Which required settings are present. Values are never reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDiagnostics {
    pub plaid_client_id_set: bool,
    pub plaid_secret_set: bool,
    pub plaid_env_set: bool,
    pub token_encryption_key_set: bool,
    pub auth_secret_set: bool,
}

impl EnvironmentDiagnostics {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let is_set = |name: &str| lookup(name).is_some_and(|value| !value.trim().is_empty());
        Self {
            plaid_client_id_set: is_set(PLAID_CLIENT_ID_ENV),
            plaid_secret_set: is_set(PLAID_SECRET_ENV),
            plaid_env_set: is_set(PLAID_ENV_ENV),
            token_encryption_key_set: is_set(TOKEN_ENCRYPTION_KEY_ENV),
            auth_secret_set: is_set(AUTH_SECRET_ENV),
        }
    }
}
