//! HTTP surface
//!
//! - `GET /stream`: WebSocket upgrade, then one binary message per feed chunk
//! - `GET /proto`: the schema file as configured at startup
//! - `GET /proto/settings`: `{"message_type": "<root type>"}`
//! - `GET /`: landing page

pub mod error;
pub mod handlers;
pub mod schema;
pub mod state;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use handlers::{metadata, stream};

pub use error::AppError;
pub use handlers::metadata::SchemaSettings;
pub use schema::{Schema, SCHEMA_CONTENT_TYPE};
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream::stream_handler))
        .route("/proto", get(metadata::schema))
        .route("/proto/settings", get(metadata::schema_settings))
        .route("/", get(metadata::index))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
