//! Lazily established, process-lifetime database handle.
//!
//! The [`ConnectionManager`] is built by the composition root and shared by
//! every request. The first call to [`ConnectionManager::database`] resolves
//! the configured location and opens the store; concurrent first callers wait
//! on that single in-flight open instead of racing to open their own.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;

/// Shared database handle.
pub type Database = Arc<Storage>;

/// URL scheme accepted for store locations.
const SQLITE_SCHEME: &str = "sqlite://";

/// Where the document store lives, as parsed from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// In-process store that lives as long as the handle.
    Memory,
    /// Directory holding one database file per logical database.
    Directory(PathBuf),
}

impl StoreLocation {
    /// Parse a connection string.
    ///
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<dir>` or a bare
    /// directory path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty strings and foreign schemes.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::configuration("database url is empty"));
        }

        if url == "sqlite::memory:" || url == ":memory:" {
            return Ok(Self::Memory);
        }

        if let Some(dir) = url.strip_prefix(SQLITE_SCHEME) {
            if dir.is_empty() {
                return Err(Error::configuration(format!(
                    "database url {url:?} has no directory"
                )));
            }
            return Ok(Self::Directory(PathBuf::from(dir)));
        }

        if let Some((scheme, _)) = url.split_once("://") {
            return Err(Error::configuration(format!(
                "unsupported database scheme {scheme:?}"
            )));
        }

        Ok(Self::Directory(PathBuf::from(url)))
    }

    /// The database file for a logical database name.
    #[must_use]
    pub fn database_path(&self, name: &str) -> Option<PathBuf> {
        match self {
            Self::Memory => None,
            Self::Directory(dir) => Some(dir.join(format!("{name}.db"))),
        }
    }
}

/// Owns the lazily opened store.
#[derive(Debug)]
pub struct ConnectionManager {
    settings: DatabaseConfig,
    database: OnceCell<Database>,
}

impl ConnectionManager {
    /// Create a manager. Nothing is opened until the first call to
    /// [`database`](Self::database).
    #[must_use]
    pub fn new(settings: DatabaseConfig) -> Self {
        Self {
            settings,
            database: OnceCell::new(),
        }
    }

    /// The logical database name in use.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.settings.name
    }

    /// Whether the store has been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.database.initialized()
    }

    /// Get the shared handle, opening the store on first use.
    ///
    /// A failed open is not memoized; the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no connection string is set or it
    /// cannot be parsed, and a storage error ([`Error::Connection`], or
    /// [`Error::DirectoryCreate`] when the directory cannot be made) if the
    /// store cannot be opened.
    pub async fn database(&self) -> Result<Database> {
        self.database
            .get_or_try_init(|| self.connect())
            .await
            .cloned()
    }

    async fn connect(&self) -> Result<Database> {
        let url = self
            .settings
            .url
            .as_deref()
            .ok_or_else(|| Error::configuration("database url is not set"))?;
        let location = StoreLocation::parse(url)?;
        let path = location.database_path(&self.settings.name);

        let storage = tokio::task::spawn_blocking(move || match path {
            Some(path) => Storage::open(path),
            None => Storage::open_in_memory(),
        })
        .await??;

        info!(
            database = %self.settings.name,
            path = %storage.path().display(),
            "Connected to database"
        );
        Ok(Arc::new(storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.map(str::to_string),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(
            StoreLocation::parse("sqlite::memory:").unwrap(),
            StoreLocation::Memory
        );
        assert_eq!(StoreLocation::parse(":memory:").unwrap(), StoreLocation::Memory);
    }

    #[test]
    fn test_parse_sqlite_url() {
        assert_eq!(
            StoreLocation::parse("sqlite:///var/lib/portfolio").unwrap(),
            StoreLocation::Directory(PathBuf::from("/var/lib/portfolio"))
        );
    }

    #[test]
    fn test_parse_bare_path() {
        assert_eq!(
            StoreLocation::parse("./data").unwrap(),
            StoreLocation::Directory(PathBuf::from("./data"))
        );
    }

    #[test]
    fn test_parse_rejects_foreign_scheme() {
        let err = StoreLocation::parse("mongodb://localhost:27017").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("mongodb"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            StoreLocation::parse("   "),
            Err(Error::Configuration { .. })
        ));
        assert!(matches!(
            StoreLocation::parse("sqlite://"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_database_path_uses_name() {
        let location = StoreLocation::Directory(PathBuf::from("/srv/data"));
        assert_eq!(
            location.database_path("portfolio"),
            Some(PathBuf::from("/srv/data/portfolio.db"))
        );
        assert_eq!(StoreLocation::Memory.database_path("portfolio"), None);
    }

    #[tokio::test]
    async fn test_missing_url_is_configuration_error() {
        let manager = ConnectionManager::new(settings(None));

        let err = manager.database().await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_unopenable_location_is_connection_error() {
        // A regular file cannot serve as the database directory.
        let file = std::env::temp_dir().join(format!("portfolio_not_a_dir_{}", std::process::id()));
        std::fs::write(&file, b"x").unwrap();

        let manager = ConnectionManager::new(settings(Some(file.to_str().unwrap())));
        let err = manager.database().await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }), "unexpected error: {err}");
        assert!(err.is_storage_error());
        assert!(!manager.is_connected());

        let _ = std::fs::remove_file(file);
    }

    #[tokio::test]
    async fn test_uncreatable_directory_is_storage_error() {
        // The directory would have to live under a regular file.
        let file = std::env::temp_dir().join(format!("portfolio_blocker_{}", std::process::id()));
        std::fs::write(&file, b"x").unwrap();
        let dir = file.join("data");

        let manager = ConnectionManager::new(settings(Some(dir.to_str().unwrap())));
        let err = manager.database().await.unwrap_err();
        assert!(matches!(err, Error::DirectoryCreate { .. }), "unexpected error: {err}");
        assert!(err.is_storage_error());
        assert!(!manager.is_connected());

        let _ = std::fs::remove_file(file);
    }

    #[tokio::test]
    async fn test_handle_is_memoized() {
        let manager = ConnectionManager::new(settings(Some("sqlite::memory:")));

        let first = manager.database().await.unwrap();
        let second = manager.database().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_connection() {
        let manager = Arc::new(ConnectionManager::new(settings(Some("sqlite::memory:"))));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.database().await.unwrap() })
            })
            .collect();

        let mut databases = Vec::new();
        for handle in handles {
            databases.push(handle.await.unwrap());
        }

        let first = &databases[0];
        assert!(databases.iter().all(|db| Arc::ptr_eq(first, db)));
    }

    #[tokio::test]
    async fn test_failed_open_is_retried() {
        let root = std::env::temp_dir().join(format!("portfolio_retry_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::write(&root, b"x").unwrap();

        let manager = ConnectionManager::new(settings(Some(root.to_str().unwrap())));
        assert!(manager.database().await.is_err());

        // Once the location becomes usable the next call succeeds.
        std::fs::remove_file(&root).unwrap();
        let db = manager.database().await.unwrap();
        assert_eq!(db.path(), root.join("portfolio.db"));

        drop(db);
        let _ = std::fs::remove_dir_all(&root);
    }
}
