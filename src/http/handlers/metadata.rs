//! Schema metadata and landing page

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::schema::SCHEMA_CONTENT_TYPE;
use crate::http::state::AppState;

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

/// Which message type in the schema wraps each feed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSettings {
    pub message_type: String,
}

/// Raw schema file
pub async fn schema(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, SCHEMA_CONTENT_TYPE)],
        state.schema.body.clone(),
    )
}

/// Decoding settings for the schema
pub async fn schema_settings(State(state): State<AppState>) -> Json<SchemaSettings> {
    Json(SchemaSettings {
        message_type: state.schema.message_type.clone(),
    })
}

/// Static landing page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
