//! Image Server
//!
//! Accepts image uploads, stores them under a date-sharded directory tree and
//! serves them back by a self-describing identifier.
//!
//! # Modules
//!
//! - `images`: identifier codec and the upload/fetch protocol
//! - `storage`: filesystem backend
//! - `routes`: HTTP surface

pub mod config;
pub mod error;
pub mod images;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let body_limit = state.config().upload.body_limit;

    Router::new()
        .merge(routes::images::router(body_limit))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
