//! HTTP surface of the session service.
//!
//! Routes map one-to-one onto [`SessionManager`] operations. Errors map onto
//! status codes: unauthorized is 401, not found is 404, everything else 500.

mod error;
mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use error::{ApiError, ErrorResponse};
pub use handlers::{DeleteResponse, ServiceInfo};

use crate::{session_manager::SessionManager, session_store::Store};

/// Header carrying the creation key on `POST /v1`.
pub const CREATION_KEY_HEADER: &str = "x-auth-key";

pub fn router<S>(manager: Arc<SessionManager<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route("/", get(handlers::echo))
        .route("/echo", get(handlers::echo))
        .route("/v1", get(handlers::echo).post(handlers::create::<S>))
        .route("/v1/echo", get(handlers::echo))
        .route(
            "/v1/{token}",
            get(handlers::get::<S>)
                .put(handlers::update::<S>)
                .patch(handlers::patch::<S>)
                .delete(handlers::delete::<S>),
        )
        .route("/v1/{token}/validate", get(handlers::validate::<S>))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(manager)
}
