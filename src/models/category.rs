use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Row shape of the `categories` table, keywords stored as a JSON array.
#[derive(sqlx::FromRow, Debug)]
pub(crate) struct CategoryRow {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub color: String,
    pub keywords: String,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        let keywords = serde_json::from_str(&row.keywords).unwrap_or_default();
        Self {
            id: row.id,
            name: row.name,
            emoji: row.emoji,
            color: row.color,
            keywords,
        }
    }
}
