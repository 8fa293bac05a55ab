//! Offline-first invoice operations.
//!
//! Every write first asks the probe whether the backend is reachable and then
//! either talks to the server or falls back to the local cache plus sync queue.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ApiError, RemoteApi};
use crate::categorize::Categorizer;
use crate::connectivity::{Reachability, ReachabilityProbe};
use crate::db::Database;
use crate::models::{Category, EntityType, Invoice, NewSyncEntry, SyncOperation};
use crate::nfce::{self, AccessKey, NfceError};

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("invoice {0} not found")]
    NotFound(String),
    #[error("receipt {0} was already scanned")]
    AlreadyScanned(String),
    #[error("scanning a receipt needs a connection to the server")]
    Offline,
    #[error("invalid receipt: {0}")]
    Nfce(#[from] NfceError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Where a write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Acknowledged by the server.
    Synced,
    /// Stored locally, waiting in the sync queue.
    Queued,
    /// A local-only record removed before it ever reached the server.
    Discarded,
}

pub struct InvoiceService {
    db: Database,
    api: Arc<dyn RemoteApi>,
    probe: Arc<dyn ReachabilityProbe>,
    user_id: String,
}

impl InvoiceService {
    pub fn new(
        db: Database,
        api: Arc<dyn RemoteApi>,
        probe: Arc<dyn ReachabilityProbe>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            db,
            api,
            probe,
            user_id: user_id.into(),
        }
    }

    pub async fn create(&self, draft: Invoice) -> Result<(Invoice, WriteOutcome)> {
        let invoice = self.prepare(draft).await?;
        let payload = serde_json::to_value(&invoice)?;

        if self.probe.probe().await == Reachability::Online {
            match self.api.create_invoice(&payload).await {
                Ok(()) => {
                    self.db.save_synced_invoice(&invoice).await?;
                    info!(id = %invoice.id, "invoice created on the server");
                    return Ok((self.reload(&invoice.id).await?, WriteOutcome::Synced));
                }
                Err(e) if e.is_transport() => {
                    warn!(id = %invoice.id, error = %e, "server unreachable, queueing invoice");
                }
                Err(e) => return Err(InvoiceError::Api(e).into()),
            }
        }

        let entry = NewSyncEntry::new(
            EntityType::Invoice,
            &invoice.id,
            SyncOperation::CreateInvoice,
            payload,
        );
        self.db.save_local_invoice(&invoice, &entry).await?;
        info!(id = %invoice.id, "invoice stored locally");

        Ok((self.reload(&invoice.id).await?, WriteOutcome::Queued))
    }

    pub async fn delete(&self, id: &str) -> Result<WriteOutcome> {
        let invoice = self
            .db
            .get_invoice(id)
            .await?
            .ok_or_else(|| InvoiceError::NotFound(id.to_string()))?;

        if invoice.local_only {
            self.db.discard_local_invoice(id).await?;
            return Ok(WriteOutcome::Discarded);
        }

        if self.probe.probe().await == Reachability::Online {
            match self.api.delete_invoice(id).await {
                Ok(()) | Err(ApiError::Status { status: 404, .. }) => {
                    self.db.delete_invoice(id).await?;
                    return Ok(WriteOutcome::Synced);
                }
                Err(e) if e.is_transport() => {
                    warn!(id, error = %e, "server unreachable, queueing delete");
                }
                Err(e) => return Err(InvoiceError::Api(e).into()),
            }
        }

        let entry = NewSyncEntry::new(
            EntityType::Invoice,
            id,
            SyncOperation::DeleteInvoice,
            serde_json::json!({ "id": id }),
        );
        self.db.delete_invoice_and_enqueue(id, &entry).await?;

        Ok(WriteOutcome::Queued)
    }

    /// The cached invoices, refreshed from the server first when it is reachable.
    pub async fn list(&self) -> Result<Vec<Invoice>> {
        if self.probe.probe().await == Reachability::Online {
            match self.api.list_invoices().await {
                Ok(remote) => {
                    let pending_deletes: HashSet<String> = self
                        .db
                        .get_sync_queue()
                        .await?
                        .into_iter()
                        .filter(|entry| entry.operation() == Some(SyncOperation::DeleteInvoice))
                        .map(|entry| entry.entity_id)
                        .collect();
                    let remote: Vec<Invoice> = remote
                        .into_iter()
                        .filter(|invoice| !pending_deletes.contains(&invoice.id))
                        .collect();

                    self.db.replace_synced_invoices(&remote).await?;
                }
                Err(e) => warn!(error = %e, "could not refresh invoices, showing cache"),
            }
        }

        self.db.get_invoices().await
    }

    pub async fn get(&self, id: &str) -> Result<Invoice> {
        self.reload(id).await
    }

    /// Hand a scanned QR payload to the server and cache the parsed receipt.
    pub async fn scan(&self, qr_code: &str) -> Result<Invoice> {
        let payload = nfce::parse_qr(qr_code).map_err(InvoiceError::from)?;
        let key = payload.access_key.as_str();

        if self.db.find_invoice_by_access_key(key).await?.is_some() {
            return Err(InvoiceError::AlreadyScanned(key.to_string()).into());
        }
        if self.probe.probe().await == Reachability::Offline {
            return Err(InvoiceError::Offline.into());
        }

        let mut invoice = self
            .api
            .scan_invoice(&payload.raw)
            .await
            .map_err(InvoiceError::from)?;
        if invoice.access_key.is_none() {
            invoice.access_key = Some(key.to_string());
        }
        if invoice.user_id.is_empty() {
            invoice.user_id = self.user_id.clone();
        }
        for item in &mut invoice.items {
            item.invoice_id = invoice.id.clone();
        }
        self.categorizer().await?.apply(&mut invoice.items);

        self.db.save_synced_invoice(&invoice).await?;
        info!(id = %invoice.id, establishment = %invoice.establishment_name, "receipt scanned");

        self.reload(&invoice.id).await
    }

    /// Cached categories, refreshed from the server first when it is reachable.
    pub async fn categories(&self, refresh: bool) -> Result<Vec<Category>> {
        if refresh && self.probe.probe().await == Reachability::Online {
            match self.api.list_categories().await {
                Ok(categories) => self.db.save_categories(&categories).await?,
                Err(e) => warn!(error = %e, "could not refresh categories, showing cache"),
            }
        }

        self.db.get_categories().await
    }

    async fn categorizer(&self) -> Result<Categorizer> {
        Ok(Categorizer::new(&self.db.get_categories().await?))
    }

    async fn reload(&self, id: &str) -> Result<Invoice> {
        let invoice = self
            .db
            .get_invoice_with_items(id)
            .await?
            .ok_or_else(|| InvoiceError::NotFound(id.to_string()))?;

        Ok(invoice)
    }

    /// Fill in identifiers, owner and totals, and categorise the items.
    async fn prepare(&self, mut invoice: Invoice) -> Result<Invoice> {
        if invoice.id.is_empty() {
            invoice.id = Uuid::new_v4().to_string();
        }
        if invoice.user_id.is_empty() {
            invoice.user_id = self.user_id.clone();
        }
        if let Some(raw) = invoice.access_key.take() {
            let key: AccessKey = raw.parse().map_err(InvoiceError::from)?;
            invoice.access_key = Some(key.to_string());
        }

        for item in &mut invoice.items {
            if item.id.is_empty() {
                item.id = Uuid::new_v4().to_string();
            }
            item.invoice_id = invoice.id.clone();
            if item.total_price == 0.0 {
                item.total_price = round_cents(item.quantity * item.unit_price);
            }
        }
        if invoice.total_value == 0.0 {
            invoice.total_value = round_cents(invoice.items_total());
        }

        self.categorizer().await?.apply(&mut invoice.items);

        Ok(invoice)
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
