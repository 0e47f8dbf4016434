use rusqlite::Connection;

/// Create the entitlement ledger schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Users and their entitlement.
        -- is_paid only ever transitions 0 -> 1; nothing resets it.
        -- payment_gateway / paid_at record the first grant.
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_paid INTEGER NOT NULL DEFAULT 0,
            payment_gateway TEXT,
            customer_reference TEXT,
            paid_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
    )
}
