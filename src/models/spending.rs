/// One row of a spending summary computed from the local cache.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct SpendingTotal {
    pub label: String,
    pub total: f64,
    pub count: i64,
}
