//! Client for the Comprei REST backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Category, Invoice};

mod http;

pub use http::HttpApi;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Transport(String),
    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }
}

/// Remote operations the client relies on.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_invoice(&self, payload: &Value) -> Result<(), ApiError>;

    async fn delete_invoice(&self, id: &str) -> Result<(), ApiError>;

    async fn list_invoices(&self) -> Result<Vec<Invoice>, ApiError>;

    /// Ask the server to fetch and parse the receipt behind an NFC-e QR payload.
    async fn scan_invoice(&self, qr_code: &str) -> Result<Invoice, ApiError>;

    async fn list_categories(&self) -> Result<Vec<Category>, ApiError>;

    /// `Ok` for any HTTP answer from the health route, whatever its status.
    async fn health(&self) -> Result<(), ApiError>;
}
