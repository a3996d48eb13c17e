//! Persisted view-tracking records.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::ClientMetadata;

/// Visit counter for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageViewCounter {
    /// The page path, unique across counters.
    pub page: String,
    /// Number of recorded visits. Never decreases.
    pub count: i64,
}

/// One recorded visit.
///
/// Entries are append-only; the timestamp is fixed when the entry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewLogEntry {
    /// Row id assigned by storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// The visited page.
    pub page: String,

    /// Best-effort client address.
    pub ip: String,

    /// Client user agent.
    pub user_agent: String,

    /// When the visit was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ViewLogEntry {
    /// Build a log entry for a visit happening now.
    ///
    /// The timestamp is truncated to microseconds, the precision storage keeps.
    #[must_use]
    pub fn new(page: impl Into<String>, client: ClientMetadata) -> Self {
        Self::at(page, client, Utc::now().trunc_subsecs(6))
    }

    /// Build a log entry with an explicit timestamp.
    #[must_use]
    pub fn at(page: impl Into<String>, client: ClientMetadata, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            page: page.into(),
            ip: client.ip,
            user_agent: client.user_agent,
            timestamp,
        }
    }
}

/// Aggregate counters plus the most recent visits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewStats {
    /// Every page counter.
    pub views: Vec<PageViewCounter>,
    /// Most recent log entries, newest first.
    pub recent_logs: Vec<ViewLogEntry>,
}
