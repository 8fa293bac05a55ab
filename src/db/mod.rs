use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::Config;
use crate::models::{
    Category, CategoryRow, Invoice, InvoiceItem, NewSyncEntry, Product, SpendingTotal,
    SyncOperation, SyncQueueEntry,
};

mod schema;

/// Local cache of server entities plus the sync queue
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn new(config: &Config) -> Result<Self> {
        Self::connect(config.database_url()).await
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {database_url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` opens its own database, so keep exactly one alive.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    // Category operations
    pub async fn get_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, emoji, color, keywords FROM categories ORDER BY name ASC",
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    pub async fn save_categories(&self, categories: &[Category]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for category in categories {
            sqlx::query(
                r#"
                INSERT INTO categories (id, name, emoji, color, keywords)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    emoji = excluded.emoji,
                    color = excluded.color,
                    keywords = excluded.keywords
                "#,
            )
            .bind(&category.id)
            .bind(&category.name)
            .bind(&category.emoji)
            .bind(&category.color)
            .bind(serde_json::to_string(&category.keywords)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    // Product operations
    pub async fn get_product(&self, code: &str) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT code, description, category_id FROM products WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(product)
    }

    // Invoice operations
    pub async fn get_invoices(&self) -> Result<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, user_id, access_key, establishment_name, date, total_value, synced, local_only
            FROM invoices
            ORDER BY date DESC
            "#,
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(invoices)
    }

    pub async fn get_invoice(&self, id: &str) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, user_id, access_key, establishment_name, date, total_value, synced, local_only
            FROM invoices
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(invoice)
    }

    pub async fn find_invoice_by_access_key(&self, access_key: &str) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT id, user_id, access_key, establishment_name, date, total_value, synced, local_only
            FROM invoices
            WHERE access_key = ?1
            "#,
        )
        .bind(access_key)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(invoice)
    }

    pub async fn get_items_by_invoice(&self, invoice_id: &str) -> Result<Vec<InvoiceItem>> {
        let mut items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT id, invoice_id, description, quantity, unit, unit_price, total_price,
                   product_code, category_id
            FROM invoice_items
            WHERE invoice_id = ?1
            ORDER BY position ASC
            "#,
        )
        .bind(invoice_id)
        .fetch_all(self.get_pool())
        .await?;

        for item in &mut items {
            if let Some(code) = &item.product_code {
                item.product = self.get_product(code).await?;
            }
        }

        Ok(items)
    }

    pub async fn get_invoice_with_items(&self, id: &str) -> Result<Option<Invoice>> {
        let Some(mut invoice) = self.get_invoice(id).await? else {
            return Ok(None);
        };
        invoice.items = self.get_items_by_invoice(id).await?;
        Ok(Some(invoice))
    }

    /// Store an invoice and replace its items, recording it as acknowledged by the server.
    pub async fn save_synced_invoice(&self, invoice: &Invoice) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_invoice(&mut tx, invoice, true, false).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Store a device-originated invoice and queue its upload in one transaction.
    pub async fn save_local_invoice(&self, invoice: &Invoice, entry: &NewSyncEntry) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        write_invoice(&mut tx, invoice, false, true).await?;
        let entry_id = insert_sync_entry(&mut tx, entry).await?;
        tx.commit().await?;

        Ok(entry_id)
    }

    /// Replace the synced part of the cache with the server's view.
    ///
    /// Local-only rows the server does not return are left alone; synced rows it no
    /// longer returns are removed. A local-only row the server does return is adopted
    /// as synced and its pending upload is dropped.
    pub async fn replace_synced_invoices(&self, invoices: &[Invoice]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let local_only: HashSet<String> =
            sqlx::query_scalar("SELECT id FROM invoices WHERE local_only = 1")
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();

        let cached: Vec<String> =
            sqlx::query_scalar("SELECT id FROM invoices WHERE synced = 1 AND local_only = 0")
                .fetch_all(&mut *tx)
                .await?;
        let remote: HashSet<&str> = invoices.iter().map(|invoice| invoice.id.as_str()).collect();

        for stale in cached.iter().filter(|id| !remote.contains(id.as_str())) {
            sqlx::query("DELETE FROM invoices WHERE id = ?1")
                .bind(stale)
                .execute(&mut *tx)
                .await?;
        }

        for invoice in invoices {
            if local_only.contains(&invoice.id) {
                sqlx::query("DELETE FROM sync_queue WHERE entity_id = ?1 AND operation = ?2")
                    .bind(&invoice.id)
                    .bind(SyncOperation::CreateInvoice.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            write_invoice(&mut tx, invoice, true, false).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn mark_invoice_synced(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE invoices SET synced = 1, local_only = 0 WHERE id = ?1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    /// Delete an invoice; its items go with it through the foreign key cascade.
    pub async fn delete_invoice(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an invoice that never reached the server together with its pending upload.
    pub async fn discard_local_invoice(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sync_queue WHERE entity_id = ?1 AND operation = ?2")
            .bind(id)
            .bind(SyncOperation::CreateInvoice.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Delete an invoice locally and queue the remote delete in one transaction.
    pub async fn delete_invoice_and_enqueue(&self, id: &str, entry: &NewSyncEntry) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let entry_id = insert_sync_entry(&mut tx, entry).await?;

        tx.commit().await?;

        Ok(entry_id)
    }

    pub async fn unsynced_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE synced = 0")
            .fetch_one(self.get_pool())
            .await?;

        Ok(count)
    }

    // Sync queue operations
    pub async fn enqueue(&self, entry: &NewSyncEntry) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_sync_entry(&mut conn, entry).await
    }

    /// All queued mutations in insertion order.
    pub async fn get_sync_queue(&self) -> Result<Vec<SyncQueueEntry>> {
        let entries = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            SELECT id, entity_type, entity_id, operation, payload, retry_count, last_error, created_at
            FROM sync_queue
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(entries)
    }

    pub async fn sync_queue_len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(self.get_pool())
            .await?;

        Ok(count)
    }

    pub async fn remove_sync_entry(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    pub async fn record_sync_failure(&self, id: i64, retry_count: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE sync_queue SET retry_count = ?1, last_error = ?2 WHERE id = ?3")
            .bind(retry_count)
            .bind(error)
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    // Spending summaries
    pub async fn monthly_spending(&self) -> Result<Vec<SpendingTotal>> {
        let totals = sqlx::query_as::<_, SpendingTotal>(
            r#"
            SELECT substr(date, 1, 7) AS label,
                   SUM(total_value) AS total,
                   COUNT(*) AS count
            FROM invoices
            GROUP BY label
            ORDER BY label DESC
            "#,
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(totals)
    }

    pub async fn category_spending(&self) -> Result<Vec<SpendingTotal>> {
        let totals = sqlx::query_as::<_, SpendingTotal>(
            r#"
            SELECT COALESCE(c.name, 'Sem categoria') AS label,
                   SUM(ii.total_price) AS total,
                   COUNT(*) AS count
            FROM invoice_items ii
            LEFT JOIN products p ON p.code = ii.product_code
            LEFT JOIN categories c ON c.id = COALESCE(p.category_id, ii.category_id)
            GROUP BY label
            ORDER BY total DESC
            "#,
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(totals)
    }
}

async fn write_invoice(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    synced: bool,
    local_only: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices (id, user_id, access_key, establishment_name, date, total_value, synced, local_only)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            access_key = excluded.access_key,
            establishment_name = excluded.establishment_name,
            date = excluded.date,
            total_value = excluded.total_value,
            synced = excluded.synced,
            local_only = excluded.local_only
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.user_id)
    .bind(&invoice.access_key)
    .bind(&invoice.establishment_name)
    .bind(invoice.date)
    .bind(invoice.total_value)
    .bind(synced)
    .bind(local_only)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM invoice_items WHERE invoice_id = ?1")
        .bind(&invoice.id)
        .execute(&mut *conn)
        .await?;

    for (position, item) in invoice.items.iter().enumerate() {
        if let Some(product) = &item.product {
            upsert_product(conn, product).await?;
        } else if let Some(code) = &item.product_code {
            upsert_product(
                conn,
                &Product {
                    code: code.clone(),
                    description: item.description.clone(),
                    category_id: None,
                },
            )
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO invoice_items (id, invoice_id, position, description, quantity, unit,
                                       unit_price, total_price, product_code, category_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&invoice.id)
        .bind(position as i64)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(item.product_code.as_ref().or(item.product.as_ref().map(|p| &p.code)))
        .bind(&item.category_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn upsert_product(conn: &mut SqliteConnection, product: &Product) -> Result<()> {
    // A product seen without a category keeps the one it already has.
    sqlx::query(
        r#"
        INSERT INTO products (code, description, category_id)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(code) DO UPDATE SET
            description = excluded.description,
            category_id = COALESCE(excluded.category_id, products.category_id)
        "#,
    )
    .bind(&product.code)
    .bind(&product.description)
    .bind(&product.category_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_sync_entry(conn: &mut SqliteConnection, entry: &NewSyncEntry) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sync_queue (entity_type, entity_id, operation, payload, retry_count, created_at)
        VALUES (?1, ?2, ?3, ?4, 0, ?5)
        RETURNING id
        "#,
    )
    .bind(entry.entity_type.as_str())
    .bind(&entry.entity_id)
    .bind(entry.operation.as_str())
    .bind(serde_json::to_string(&entry.payload)?)
    .bind(Utc::now().timestamp_millis())
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Open the local cache and make sure the schema exists
pub async fn init(config: &Config) -> Result<Database> {
    let db = Database::new(config).await?;
    db.migrate().await?;

    Ok(db)
}
