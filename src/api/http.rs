use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{ApiError, RemoteApi};
use crate::config::Config;
use crate::models::{Category, Invoice};

/// `RemoteApi` over HTTP with an optional bearer token.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(&config.api_url, config.api_token.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ApiError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn create_invoice(&self, payload: &Value) -> Result<(), ApiError> {
        self.send(self.client.post(self.url("invoices")).json(payload))
            .await
            .map(|_| ())
    }

    async fn delete_invoice(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.client.delete(self.url(&format!("invoices/{id}"))))
            .await
            .map(|_| ())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, ApiError> {
        self.json(self.client.get(self.url("invoices"))).await
    }

    async fn scan_invoice(&self, qr_code: &str) -> Result<Invoice, ApiError> {
        let body = json!({ "qrCode": qr_code });
        self.json(self.client.post(self.url("invoices/scan")).json(&body))
            .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.json(self.client.get(self.url("categories"))).await
    }

    async fn health(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .get(self.url("health"))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        debug!(status = %response.status(), "health check answered");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_without_duplicate_slashes() {
        let api = HttpApi::new("https://api.comprei.app/", None, Duration::from_secs(1)).unwrap();

        assert_eq!(api.base_url(), "https://api.comprei.app");
        assert_eq!(api.url("/invoices"), "https://api.comprei.app/invoices");
        assert_eq!(api.url("invoices/abc"), "https://api.comprei.app/invoices/abc");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let api = HttpApi::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();

        let err = api.delete_invoice("inv-1").await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn health_on_a_closed_port_is_a_transport_error() {
        let api = HttpApi::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();

        assert!(api.health().await.unwrap_err().is_transport());
    }
}
