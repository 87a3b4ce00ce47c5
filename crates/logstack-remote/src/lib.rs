//! Client side of the search engine's administrative API.
//!
//! This crate provides the `SearchAdminApi` trait the index manager talks to,
//! `SearchEndpoint` for building index URLs from a resolved host, and
//! `HttpSearchAdmin`, the `ureq` implementation.

pub mod endpoint;
pub mod http;

pub use endpoint::SearchEndpoint;
pub use http::HttpSearchAdmin;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Status and raw body of an administrative call.
///
/// Non-success statuses are returned here rather than as errors so callers
/// can surface the body verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

pub trait SearchAdminApi: Send + Sync {
    /// `POST /api/v1/indexes` with the schema document as body.
    fn create_index(
        &self,
        endpoint: &SearchEndpoint,
        schema: &Value,
    ) -> Result<ApiResponse, RemoteError>;

    /// `DELETE /api/v1/indexes/{index_id}/`.
    fn delete_index(
        &self,
        endpoint: &SearchEndpoint,
        index_id: &str,
    ) -> Result<ApiResponse, RemoteError>;

    /// `GET /api/v1/indexes`.
    fn list_indexes(&self, endpoint: &SearchEndpoint) -> Result<ApiResponse, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_200_is_success() {
        let ok = ApiResponse {
            status: 200,
            body: String::new(),
        };
        let created = ApiResponse {
            status: 201,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!created.is_success());
    }
}
