use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{ApiError, RemoteApi};
use crate::models::{Category, Invoice};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Create(String),
    Delete(String),
    List,
    Scan(String),
    Categories,
}

/// In-memory backend that records every call.
#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    unreachable: Mutex<bool>,
    invoices: Mutex<Vec<Invoice>>,
    categories: Mutex<Vec<Category>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Calls touching `id` answer with HTTP 500.
    pub(crate) fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    /// Every call fails as if the connection dropped.
    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    pub(crate) fn set_invoices(&self, invoices: Vec<Invoice>) {
        *self.invoices.lock().unwrap() = invoices;
    }

    pub(crate) fn set_categories(&self, categories: Vec<Category>) {
        *self.categories.lock().unwrap() = categories;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, id: Option<&str>) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);

        if *self.unreachable.lock().unwrap() {
            return Err(ApiError::Transport("connection refused".to_string()));
        }
        if id.is_some_and(|id| self.failing.lock().unwrap().contains(id)) {
            return Err(ApiError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn create_invoice(&self, payload: &Value) -> Result<(), ApiError> {
        let id = payload["id"].as_str().unwrap_or_default().to_string();
        self.record(Call::Create(id.clone()), Some(&id))
    }

    async fn delete_invoice(&self, id: &str) -> Result<(), ApiError> {
        self.record(Call::Delete(id.to_string()), Some(id))
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, ApiError> {
        self.record(Call::List, None)?;
        Ok(self.invoices.lock().unwrap().clone())
    }

    async fn scan_invoice(&self, qr_code: &str) -> Result<Invoice, ApiError> {
        self.record(Call::Scan(qr_code.to_string()), None)?;
        self.invoices
            .lock()
            .unwrap()
            .first()
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                body: "receipt not found".to_string(),
            })
    }

    async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.record(Call::Categories, None)?;
        Ok(self.categories.lock().unwrap().clone())
    }

    async fn health(&self) -> Result<(), ApiError> {
        if *self.unreachable.lock().unwrap() {
            return Err(ApiError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}
