pub mod api;
pub mod app;
pub mod categorize;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod invoices;
pub mod models;
pub mod nfce;
pub mod sync;

pub use app::AppState;
pub use config::Config;
pub use connectivity::{ConnectivityMonitor, Reachability, ReachabilityProbe};
pub use db::Database;
pub use invoices::{InvoiceError, InvoiceService, WriteOutcome};
pub use sync::{SyncPolicy, SyncReport, SyncService, spawn_auto_sync};
