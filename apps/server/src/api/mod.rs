//! HTTP routes.

mod connections;
mod diagnostics;
mod webhooks;

use std::sync::Arc;

use axum::Router;

use crate::main_lib::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(webhooks::router())
        .nest(
            "/api/v1",
            Router::new()
                .merge(connections::router())
                .merge(diagnostics::router()),
        )
}

#[cfg(test)]
pub(crate) mod test_support;
