//! # Storage Context
//!
//! Locators and credentials for the emulated key-value store, forwarded to
//! the executing handler in a request header.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::errors::{FunctionError, FunctionResult};

/// Header carrying the encoded storage context
pub const STORAGE_CONTEXT_HEADER: &str = "x-nf-storage-context";

/// Storage context configured for a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageContext {
    pub primary_region: Option<String>,
    pub edge_url: String,
    pub token: String,
}

/// Property bag the handler reads back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageContextPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_region: Option<String>,
    pub url: String,
    pub url_uncached: String,
    pub token: String,
}

impl StorageContext {
    pub fn new(edge_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            primary_region: None,
            edge_url: edge_url.into(),
            token: token.into(),
        }
    }

    pub fn with_primary_region(mut self, region: impl Into<String>) -> Self {
        self.primary_region = Some(region.into());
        self
    }

    /// The edge URL is exposed under both the cached and uncached keys
    pub fn payload(&self) -> StorageContextPayload {
        StorageContextPayload {
            primary_region: self.primary_region.clone(),
            url: self.edge_url.clone(),
            url_uncached: self.edge_url.clone(),
            token: self.token.clone(),
        }
    }

    /// Base64 of the JSON payload
    pub fn encode(&self) -> FunctionResult<String> {
        let json = serde_json::to_vec(&self.payload())
            .map_err(|e| FunctionError::Internal(format!("Failed to encode storage context: {}", e)))?;
        Ok(STANDARD.encode(json))
    }
}

/// Decode a header value produced by [`StorageContext::encode`]
#[cfg(test)]
pub(crate) fn decode_payload(encoded: &str) -> FunctionResult<StorageContextPayload> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| FunctionError::Internal(format!("Invalid storage context encoding: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FunctionError::Internal(format!("Invalid storage context payload: {}", e)))
}
