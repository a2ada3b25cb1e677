//! Bearer authentication for the connection endpoints.
//!
//! Callers present an HS256 JWT whose `sub` claim is their user id.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::main_lib::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

pub struct BearerAuth {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl BearerAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Returns the user id carried by a valid token.
    pub fn verify(&self, token: &str) -> Result<String, ApiError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid bearer token: {}", e)))?;
        let user_id = data.claims.sub.trim();
        if user_id.is_empty() {
            return Err(ApiError::Unauthorized("Token has no subject".to_string()));
        }
        Ok(user_id.to_string())
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let user_id = state.auth.verify(token)?;
        Ok(Self { user_id })
    }
}
