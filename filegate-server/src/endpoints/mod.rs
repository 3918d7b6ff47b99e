//! Contains all HTTP endpoint handlers.
//!
//! Use [`routes`] to create a router with all endpoints.

use axum::Router;

use crate::state::ServiceState;

mod files;
pub mod health;

pub fn routes(max_upload_size: usize) -> Router<ServiceState> {
    Router::new()
        .merge(health::router())
        .merge(files::router(max_upload_size))
}
