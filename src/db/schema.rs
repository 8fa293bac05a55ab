/// Schema of the local cache, applied in order on start-up.
pub(super) const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        emoji TEXT NOT NULL DEFAULT '',
        color TEXT NOT NULL DEFAULT '',
        keywords TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        code TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        category_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoices (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        access_key TEXT,
        establishment_name TEXT NOT NULL,
        date TEXT NOT NULL,
        total_value REAL NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        local_only INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_invoices_access_key ON invoices(access_key)",
    r#"
    CREATE TABLE IF NOT EXISTS invoice_items (
        id TEXT PRIMARY KEY,
        invoice_id TEXT NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        position INTEGER NOT NULL DEFAULT 0,
        description TEXT NOT NULL DEFAULT '',
        quantity REAL NOT NULL,
        unit TEXT NOT NULL DEFAULT '',
        unit_price REAL NOT NULL,
        total_price REAL NOT NULL,
        product_code TEXT REFERENCES products(code),
        category_id TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice ON invoice_items(invoice_id)",
    r#"
    CREATE TABLE IF NOT EXISTS sync_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        operation TEXT NOT NULL,
        payload TEXT NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
];
