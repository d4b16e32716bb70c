//! Schema description served to subscribers
//!
//! The schema file and the name of its root message type are read once at
//! startup and never change afterwards.

use std::path::Path;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Content type of the raw schema file
pub const SCHEMA_CONTENT_TYPE: &str = "application/vnd.google.protobuf";

/// Static decoding hints for the feed
#[derive(Debug, Clone)]
pub struct Schema {
    /// Raw schema file contents
    pub body: Bytes,
    /// Root/envelope message type within the schema
    pub message_type: String,
}

impl Schema {
    /// Create a schema from in-memory contents
    pub fn new(body: impl Into<Bytes>, message_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            message_type: message_type.into(),
        }
    }

    /// Read the schema file from disk
    pub async fn load(path: &Path, message_type: impl Into<String>) -> Result<Self> {
        let body = tokio::fs::read(path).await.map_err(|source| Error::Schema {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            path = %path.display(),
            bytes = body.len(),
            "Schema loaded"
        );

        Ok(Self::new(body, message_type))
    }
}
