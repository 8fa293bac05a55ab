use serde::{Deserialize, Serialize};

/// A catalogue entry identified by its EAN-like code.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub category_id: Option<String>,
}
