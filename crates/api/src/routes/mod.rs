pub mod channels;
pub mod health;
pub mod metrics;
pub mod queue;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .merge(queue::router())
        .merge(channels::router())
        .with_state(state)
}
