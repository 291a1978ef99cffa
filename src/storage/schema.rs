//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Spimex-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    links_found INTEGER NOT NULL DEFAULT 0,
    records_ingested INTEGER NOT NULL DEFAULT 0
);

-- One row per instrument per trading day
CREATE TABLE IF NOT EXISTS bulletins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange_product_id TEXT NOT NULL,
    exchange_product_name TEXT NOT NULL,
    oil_id TEXT NOT NULL,
    delivery_basis_id TEXT NOT NULL,
    delivery_basis_name TEXT NOT NULL,
    delivery_type_id TEXT NOT NULL,
    volume INTEGER NOT NULL CHECK (volume >= 0),
    total INTEGER NOT NULL CHECK (total >= 0),
    count INTEGER NOT NULL CHECK (count >= 0),
    date TEXT NOT NULL,
    created_on TEXT NOT NULL,
    updated_on TEXT NOT NULL,
    UNIQUE(exchange_product_id, date)
);

CREATE INDEX IF NOT EXISTS idx_bulletins_date ON bulletins(date);
CREATE INDEX IF NOT EXISTS idx_bulletins_oil ON bulletins(oil_id);
CREATE INDEX IF NOT EXISTS idx_bulletins_basis ON bulletins(delivery_basis_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["runs", "bulletins"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_negative_volume_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO bulletins (exchange_product_id, exchange_product_name, oil_id,
             delivery_basis_id, delivery_basis_name, delivery_type_id, volume, total, count,
             date, created_on, updated_on)
             VALUES ('A592BO02A', 'x', 'A592', 'BO0', 'x', '0', -1, 0, 1, '2025-01-05', '', '')",
            [],
        );
        assert!(result.is_err());
    }
}
