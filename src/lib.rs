//! Back office for a small tutoring academy: student profiles and the
//! weekly two-teacher lesson board.

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod schedule;
pub mod state;

use state::AppState;

/// Full HTTP application with its state attached.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::all_routes())
        .layer(CorsLayer::permissive())     // tighten in production
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
