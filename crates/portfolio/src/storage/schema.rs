//! `SQLite` schema definitions for the view store.
//!
//! Tables are created idempotently when a database is opened.

use rusqlite::Connection;

use crate::error::Result;

/// SQL statement to create the per-page counter table.
pub const CREATE_VIEWS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS views (
    page TEXT PRIMARY KEY NOT NULL,
    count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0)
)
";

/// SQL statement to create the append-only visit log.
pub const CREATE_VIEWS_LOG_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS views_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page TEXT NOT NULL,
    ip TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
";

/// SQL statement to create an index on timestamp for recent-log queries.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_views_log_timestamp ON views_log(timestamp DESC, id DESC)
";

/// SQL statement to create an index on page for per-page log lookups.
pub const CREATE_PAGE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_views_log_page ON views_log(page)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_VIEWS_TABLE,
    CREATE_VIEWS_LOG_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_PAGE_INDEX,
];

/// Create all tables and indexes that don't exist yet.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().expect("failed to create in-memory database")
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_initialize_schema_creates_tables() {
        let conn = create_test_db();
        initialize_schema(&conn).expect("failed to initialize schema");

        assert!(table_exists(&conn, "views"));
        assert!(table_exists(&conn, "views_log"));
    }

    #[test]
    fn test_initialize_schema_idempotent() {
        let conn = create_test_db();

        initialize_schema(&conn).expect("first init failed");
        initialize_schema(&conn).expect("second init failed");
    }

    #[test]
    fn test_indexes_created() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='views_log'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();

        assert!(indexes.iter().any(|n| n.contains("timestamp")));
        assert!(indexes.iter().any(|n| n.contains("page")));
    }

    #[test]
    fn test_views_count_cannot_go_negative() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        let result = conn.execute("INSERT INTO views (page, count) VALUES ('/x', -1)", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_views_page_is_unique() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        conn.execute("INSERT INTO views (page, count) VALUES ('/x', 1)", [])
            .unwrap();
        let result = conn.execute("INSERT INTO views (page, count) VALUES ('/x', 1)", []);
        assert!(result.is_err());
    }
}
