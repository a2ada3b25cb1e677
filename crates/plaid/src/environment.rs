use std::fmt;
use std::str::FromStr;

use crate::error::PlaidError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaidEnvironment {
    #[default]
    Sandbox,
    Development,
    Production,
}

impl PlaidEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.plaid.com",
            Self::Development => "https://development.plaid.com",
            Self::Production => "https://production.plaid.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for PlaidEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaidEnvironment {
    type Err = PlaidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(PlaidError::invalid_request(format!(
                "Unknown Plaid environment '{}'",
                other
            ))),
        }
    }
}

/// Connection and link settings for [`crate::PlaidClient`].
#[derive(Clone)]
pub struct PlaidConfig {
    pub client_id: String,
    pub secret: String,
    pub environment: PlaidEnvironment,
    /// Overrides the environment's base URL (tests, proxies).
    pub base_url: Option<String>,
    pub client_name: String,
    pub redirect_uri: Option<String>,
    pub webhook_url: Option<String>,
    pub country_codes: Vec<String>,
    pub language: String,
}

impl PlaidConfig {
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: secret.into(),
            environment: PlaidEnvironment::default(),
            base_url: None,
            client_name: "Northstar Finance".to_string(),
            redirect_uri: None,
            webhook_url: None,
            country_codes: vec!["US".to_string()],
            language: "en".to_string(),
        }
    }

    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.environment.base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl fmt::Debug for PlaidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaidConfig")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("client_name", &self.client_name)
            .field("redirect_uri", &self.redirect_uri)
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}
