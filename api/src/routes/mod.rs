use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod sse;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(sse::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
