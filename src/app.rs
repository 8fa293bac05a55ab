use std::sync::Arc;

use anyhow::Result;

use crate::api::{HttpApi, RemoteApi};
use crate::config::Config;
use crate::connectivity::{HttpProbe, ReachabilityProbe};
use crate::db::{self, Database};
use crate::invoices::InvoiceService;
use crate::sync::{SyncPolicy, SyncService};

/// Everything one session of the app works with, built once at start-up.
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub invoices: InvoiceService,
    pub sync: Arc<SyncService>,
}

impl AppState {
    /// Open the local cache and wire the HTTP client and probe from `config`.
    pub async fn new(config: Config) -> Result<Self> {
        let db = db::init(&config).await?;
        let api: Arc<dyn RemoteApi> = Arc::new(HttpApi::from_config(&config)?);
        let probe: Arc<dyn ReachabilityProbe> =
            Arc::new(HttpProbe::new(&config.api_url, config.request_timeout())?);

        Ok(Self::with_parts(config, db, api, probe))
    }

    pub fn with_parts(
        config: Config,
        db: Database,
        api: Arc<dyn RemoteApi>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let invoices = InvoiceService::new(db.clone(), api.clone(), probe.clone(), &config.user_id);
        let sync = Arc::new(SyncService::new(
            db.clone(),
            api,
            probe.clone(),
            SyncPolicy::from_config(&config),
        ));

        Self {
            config,
            db,
            probe,
            invoices,
            sync,
        }
    }
}
