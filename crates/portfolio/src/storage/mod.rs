//! Storage layer for view tracking.
//!
//! This module provides `SQLite`-backed persistence for page counters and the
//! visit log. A [`Storage`] is the database handle the connection manager
//! hands out; it is shared across requests behind an `Arc`.

pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{PageViewCounter, ViewLogEntry, ViewStats};

/// Path reported for in-memory databases.
pub const MEMORY_PATH: &str = ":memory:";

/// Storage engine for page counters and visit logs.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Atomic per-page counter increments
/// - Append-only visit logging, linked to the increment in one transaction
/// - Recent-log queries ordered by timestamp
/// - Opt-in pruning of the visit log
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection. `rusqlite` connections are not `Sync`.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryCreate`] if the parent directory cannot be
    /// created, or [`Error::Connection`] if the database cannot be opened or
    /// initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::Connection {
            path: path.clone(),
            source,
        })?;

        // WAL keeps the CLI's reads from blocking the server's writes.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|source| Error::Connection {
                path: path.clone(),
                source,
            })?;

        Self::init(path, conn)
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(MEMORY_PATH);
        let conn = Connection::open_in_memory().map_err(|source| Error::Connection {
            path: path.clone(),
            source,
        })?;

        Self::init(path, conn)
    }

    fn init(path: PathBuf, conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn).map_err(|err| match err {
            Error::Storage(source) => Error::Connection {
                path: path.clone(),
                source,
            },
            other => other,
        })?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("database connection mutex poisoned"))
    }

    /// Record a visit: bump the page counter and append the log entry.
    ///
    /// Both writes commit together or not at all. Returns the page's new
    /// count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_visit(&self, entry: &ViewLogEntry) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r"
            INSERT INTO views (page, count) VALUES (?1, 1)
            ON CONFLICT(page) DO UPDATE SET count = views.count + 1
            ",
            [&entry.page],
        )?;

        tx.execute(
            r"
            INSERT INTO views_log (page, ip, user_agent, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                entry.page,
                entry.ip,
                entry.user_agent,
                format_timestamp(entry.timestamp),
            ],
        )?;

        let count: i64 = tx.query_row(
            "SELECT count FROM views WHERE page = ?1",
            [&entry.page],
            |row| row.get(0),
        )?;

        tx.commit()?;
        debug!(page = %entry.page, count, "Recorded visit");
        Ok(count)
    }

    /// Get every page counter, most visited first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn page_views(&self) -> Result<Vec<PageViewCounter>> {
        let conn = self.conn()?;
        Self::query_page_views(&conn)
    }

    /// Read every counter and the latest `limit` log entries as one snapshot.
    ///
    /// Both reads share a single read transaction, so a visit appears in
    /// both halves or in neither.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn view_stats(&self, limit: usize) -> Result<ViewStats> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let stats = ViewStats {
            views: Self::query_page_views(&tx)?,
            recent_logs: Self::query_recent_logs(&tx, limit)?,
        };

        tx.commit()?;
        Ok(stats)
    }

    /// Get the counter for a single page.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn page_view(&self, page: &str) -> Result<Option<PageViewCounter>> {
        let conn = self.conn()?;
        let counter = conn
            .query_row(
                "SELECT page, count FROM views WHERE page = ?1",
                [page],
                Self::row_to_counter,
            )
            .optional()?;
        Ok(counter)
    }

    /// Get the most recent log entries, newest first.
    ///
    /// Entries sharing a timestamp are ordered by insertion, latest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<ViewLogEntry>> {
        let conn = self.conn()?;
        Self::query_recent_logs(&conn, limit)
    }

    /// Count log entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn log_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM views_log", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete log entries older than the given age. Counters are untouched.
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_logs_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = format_timestamp(Utc::now() - max_age);

        let conn = self.conn()?;
        let affected = conn.execute("DELETE FROM views_log WHERE timestamp < ?1", [cutoff])?;

        if affected > 0 {
            info!("Pruned {} old log entries", affected);
        }
        Ok(affected)
    }

    /// Keep only the most recent `keep_count` log entries.
    ///
    /// Returns the number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_logs_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep_count).unwrap_or(i64::MAX);

        let conn = self.conn()?;
        let affected = conn.execute(
            r"
            DELETE FROM views_log WHERE id NOT IN (
                SELECT id FROM views_log ORDER BY timestamp DESC, id DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            info!("Pruned {} log entries to keep {} recent", affected, keep_count);
        }
        Ok(affected)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn summary(&self) -> Result<StorageSummary> {
        let conn = self.conn()?;

        let (total_pages, total_views): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(count), 0) FROM views",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (total_log_entries, oldest, newest): (i64, Option<String>, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM views_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        drop(conn);

        let db_size_bytes = if self.path.as_os_str() == MEMORY_PATH {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageSummary {
            total_pages,
            total_views,
            total_log_entries,
            oldest_log: oldest.as_deref().and_then(|s| parse_timestamp(s).ok()),
            newest_log: newest.as_deref().and_then(|s| parse_timestamp(s).ok()),
            db_size_bytes,
        })
    }

    fn query_page_views(conn: &Connection) -> Result<Vec<PageViewCounter>> {
        let mut stmt = conn.prepare("SELECT page, count FROM views ORDER BY count DESC, page ASC")?;

        let views = stmt
            .query_map([], Self::row_to_counter)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(views)
    }

    fn query_recent_logs(conn: &Connection, limit: usize) -> Result<Vec<ViewLogEntry>> {
        let mut stmt = conn.prepare(
            r"
            SELECT id, page, ip, user_agent, timestamp
            FROM views_log ORDER BY timestamp DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let logs = stmt
            .query_map([limit_i64], Self::row_to_log_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    fn row_to_counter(row: &rusqlite::Row) -> rusqlite::Result<PageViewCounter> {
        Ok(PageViewCounter {
            page: row.get(0)?,
            count: row.get(1)?,
        })
    }

    fn row_to_log_entry(row: &rusqlite::Row) -> rusqlite::Result<ViewLogEntry> {
        let timestamp_str: String = row.get(4)?;
        let timestamp = parse_timestamp(&timestamp_str).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err))
        })?;

        Ok(ViewLogEntry {
            id: Some(row.get(0)?),
            page: row.get(1)?,
            ip: row.get(2)?,
            user_agent: row.get(3)?,
            timestamp,
        })
    }

    /// Run raw SQL against the connection.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }
}

/// Fixed-width UTC form, so text order matches time order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSummary {
    /// Number of pages with a counter.
    pub total_pages: i64,
    /// Sum of all page counters.
    pub total_views: i64,
    /// Number of log entries stored.
    pub total_log_entries: i64,
    /// Timestamp of the oldest log entry.
    pub oldest_log: Option<DateTime<Utc>>,
    /// Timestamp of the newest log entry.
    pub newest_log: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
