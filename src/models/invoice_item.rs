use serde::{Deserialize, Serialize};

use super::{Product, de_number};

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub invoice_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "de_number")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(deserialize_with = "de_number")]
    pub unit_price: f64,
    #[serde(default, deserialize_with = "de_number")]
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    // Assigned on the device when the product carries no category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

impl InvoiceItem {
    /// The text used to describe the item, preferring the product catalogue.
    pub fn display_name(&self) -> &str {
        match &self.product {
            Some(product) if !product.description.is_empty() => &product.description,
            _ => &self.description,
        }
    }
}
