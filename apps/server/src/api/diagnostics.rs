use std::sync::Arc;

use axum::{routing::get, Json, Router};

use crate::auth::AuthUser;
use crate::config::EnvironmentDiagnostics;
use crate::main_lib::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/diagnostics", get(environment_diagnostics))
}

async fn environment_diagnostics(_user: AuthUser) -> Json<EnvironmentDiagnostics> {
    Json(EnvironmentDiagnostics::from_env())
}
