use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use comprei::api::{ApiError, RemoteApi};
use comprei::models::{Category, Invoice, InvoiceItem};
use comprei::{AppState, Config, Database, Reachability, ReachabilityProbe, WriteOutcome};

/// Backend whose availability follows the shared switch.
struct Backend {
    online: Arc<AtomicBool>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl Backend {
    fn check(&self) -> Result<(), ApiError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Transport("network unreachable".to_string()))
        }
    }
}

#[async_trait]
impl RemoteApi for Backend {
    async fn create_invoice(&self, payload: &Value) -> Result<(), ApiError> {
        self.check()?;
        let id = payload["id"].as_str().unwrap_or_default().to_string();
        self.created.lock().unwrap().push(id);
        Ok(())
    }

    async fn delete_invoice(&self, id: &str) -> Result<(), ApiError> {
        self.check()?;
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn list_invoices(&self) -> Result<Vec<Invoice>, ApiError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn scan_invoice(&self, _qr_code: &str) -> Result<Invoice, ApiError> {
        self.check()?;
        Err(ApiError::Status {
            status: 422,
            body: "unsupported state portal".to_string(),
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.check()
    }
}

struct Switch(Arc<AtomicBool>);

#[async_trait]
impl ReachabilityProbe for Switch {
    async fn probe(&self) -> Reachability {
        if self.0.load(Ordering::SeqCst) {
            Reachability::Online
        } else {
            Reachability::Offline
        }
    }
}

fn config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        api_url: "http://localhost:3000".to_string(),
        api_token: None,
        user_id: "device-user".to_string(),
        sync_delay_ms: 0,
        sync_max_retries: 3,
        connectivity_interval_secs: 1,
        request_timeout_secs: 1,
    }
}

async fn app(online: &Arc<AtomicBool>) -> (AppState, Arc<Backend>) {
    let config = config();
    let db = Database::connect(config.database_url()).await.unwrap();
    db.migrate().await.unwrap();

    let backend = Arc::new(Backend {
        online: online.clone(),
        created: Mutex::new(Vec::new()),
        deleted: Mutex::new(Vec::new()),
    });
    let app = AppState::with_parts(
        config,
        db,
        backend.clone(),
        Arc::new(Switch(online.clone())),
    );

    (app, backend)
}

fn receipt(establishment: &str, amount: f64) -> Invoice {
    Invoice {
        id: String::new(),
        user_id: String::new(),
        access_key: None,
        establishment_name: establishment.to_string(),
        date: Utc.with_ymd_and_hms(2024, 8, 15, 18, 45, 0).unwrap(),
        total_value: 0.0,
        items: vec![InvoiceItem {
            id: String::new(),
            invoice_id: String::new(),
            description: "PAO FRANCES KG".to_string(),
            quantity: 1.0,
            unit: "KG".to_string(),
            unit_price: amount,
            total_price: 0.0,
            product_code: None,
            category_id: None,
            product: None,
        }],
        synced: false,
        local_only: false,
    }
}

#[tokio::test]
async fn receipts_captured_offline_upload_once_back_online() {
    let online = Arc::new(AtomicBool::new(false));
    let (app, backend) = app(&online).await;

    let (first, outcome) = app.invoices.create(receipt("Padaria Estrela", 14.9)).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Queued);
    let (second, _) = app.invoices.create(receipt("Mercadinho Sol", 8.5)).await.unwrap();
    assert_eq!(first.user_id, "device-user");

    let offline = app.sync.drain().await.unwrap();
    assert_eq!(offline.error.as_deref(), Some("offline"));
    assert_eq!(offline.unsynced_count, 2);

    online.store(true, Ordering::SeqCst);
    let report = app.sync.drain().await.unwrap();

    assert!(report.success);
    assert_eq!(report.synced, 2);
    assert_eq!(report.unsynced_count, 0);
    assert_eq!(*backend.created.lock().unwrap(), vec![first.id.clone(), second.id.clone()]);
    assert_eq!(app.db.sync_queue_len().await.unwrap(), 0);

    let cached = app.invoices.get(&first.id).await.unwrap();
    assert!(cached.synced);
    assert!(!cached.local_only);
    assert_eq!(cached.items.len(), 1);
}

#[tokio::test]
async fn offline_delete_reaches_the_server_on_the_next_drain() {
    let online = Arc::new(AtomicBool::new(true));
    let (app, backend) = app(&online).await;
    let (invoice, outcome) = app.invoices.create(receipt("Açougue Boi Bom", 52.0)).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Synced);

    online.store(false, Ordering::SeqCst);
    assert_eq!(app.invoices.delete(&invoice.id).await.unwrap(), WriteOutcome::Queued);
    assert!(app.invoices.list().await.unwrap().is_empty());

    online.store(true, Ordering::SeqCst);
    let report = app.sync.drain().await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(*backend.deleted.lock().unwrap(), vec![invoice.id]);
}
