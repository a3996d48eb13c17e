//! Client metadata derived from request headers.
//!
//! The address is best-effort: it trusts whatever proxy headers arrive with
//! the request, so it is only fit for analytics.

use axum::http::{header::USER_AGENT, HeaderMap};

/// Value recorded when a header is missing or empty.
pub const UNKNOWN: &str = "unknown";

/// Proxy header carrying the original client chain, leftmost first.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Proxy header carrying the single client address.
pub const REAL_IP: &str = "x-real-ip";

/// Who made a request, as far as the headers say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMetadata {
    /// Client address, or [`UNKNOWN`].
    pub ip: String,
    /// Client user agent, or [`UNKNOWN`].
    pub user_agent: String,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            ip: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
        }
    }
}

/// Derive the client address and user agent from request headers.
///
/// The address is the first entry of `x-forwarded-for`, then `x-real-ip`,
/// then [`UNKNOWN`]. The user agent falls back to [`UNKNOWN`] as well.
#[must_use]
pub fn derive_client_metadata(headers: &HeaderMap) -> ClientMetadata {
    let ip = header_str(headers, FORWARDED_FOR)
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, REAL_IP))
        .unwrap_or(UNKNOWN);

    let user_agent = header_str(headers, USER_AGENT.as_str()).unwrap_or(UNKNOWN);

    ClientMetadata {
        ip: ip.to_string(),
        user_agent: user_agent.to_string(),
    }
}

/// A header as trimmed, non-empty text.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
