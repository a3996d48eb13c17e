//! View tracking service.
//!
//! Records page visits and, behind the stats secret, reports aggregate
//! counts with the most recent visits. Each call is independent; the only
//! shared state is the database handle owned by the [`ConnectionManager`].

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde_json::Value;
use tracing::warn;

use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::metadata::ClientMetadata;
use crate::model::{ViewLogEntry, ViewStats};

/// Number of log entries returned by [`ViewTracker::fetch_stats`].
pub const RECENT_LOG_LIMIT: usize = 50;

const BEARER_PREFIX: &str = "Bearer ";

/// Records visits and serves stats.
#[derive(Debug, Clone)]
pub struct ViewTracker {
    connection: Arc<ConnectionManager>,
    stats_secret: Option<String>,
}

impl ViewTracker {
    /// Create a tracker over a shared connection manager.
    #[must_use]
    pub fn new(connection: Arc<ConnectionManager>, stats_secret: Option<String>) -> Self {
        Self {
            connection,
            stats_secret,
        }
    }

    /// Record one visit to `page`.
    ///
    /// Returns the page's new count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty page (before touching the
    /// store), or a storage/connection error if the write fails.
    pub async fn record_visit(&self, page: &str, client: ClientMetadata) -> Result<i64> {
        if page.is_empty() {
            return Err(Error::invalid_input("Invalid page parameter"));
        }

        let entry = ViewLogEntry::new(page, client);
        let db = self.connection.database().await?;

        tokio::task::spawn_blocking(move || db.record_visit(&entry)).await?
    }

    /// Return every page counter and the most recent visits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] unless `token` equals the configured
    /// secret; with no (or an empty) secret every token is rejected.
    pub async fn fetch_stats(&self, token: Option<&str>) -> Result<ViewStats> {
        if !self.is_authorized(token) {
            warn!("Rejected stats request with invalid token");
            return Err(Error::Unauthorized);
        }

        self.snapshot(RECENT_LOG_LIMIT).await
    }

    /// Read counters and the latest `limit` log entries without a token.
    ///
    /// Both come from one store snapshot.
    ///
    /// # Errors
    ///
    /// Returns a storage/connection error if a read fails.
    pub async fn snapshot(&self, limit: usize) -> Result<ViewStats> {
        let db = self.connection.database().await?;

        tokio::task::spawn_blocking(move || db.view_stats(limit)).await?
    }

    fn is_authorized(&self, token: Option<&str>) -> bool {
        match (self.stats_secret.as_deref(), token) {
            (Some(secret), Some(token)) => !secret.is_empty() && secret == token,
            _ => false,
        }
    }
}

/// Extract the page from a visit payload.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless `page` is a non-empty string.
pub fn page_from_payload(payload: &Value) -> Result<&str> {
    match payload.get("page") {
        Some(Value::String(page)) if !page.is_empty() => Ok(page),
        _ => Err(Error::invalid_input("Invalid page parameter")),
    }
}

/// Extract the bearer token from an `Authorization` header.
///
/// The `Bearer ` prefix is optional; an absent header yields `None`.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix(BEARER_PREFIX).unwrap_or(value))
}
