use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InvoiceItem, de_number};

/// A fiscal receipt as cached on the device.
///
/// `synced` and `local_only` are device bookkeeping and never travel over the wire.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    pub establishment_name: String,
    pub date: DateTime<Utc>,
    #[serde(deserialize_with = "de_number")]
    pub total_value: f64,
    #[sqlx(skip)]
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[serde(skip)]
    pub synced: bool,
    #[serde(skip)]
    pub local_only: bool,
}

impl Invoice {
    /// Sum of the item totals, used when a draft arrives without a total.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|item| item.total_price).sum()
    }
}
