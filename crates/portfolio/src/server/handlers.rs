//! Request handlers.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use serde_json::Value;

use super::SharedState;
use crate::error::{Error, Result};
use crate::metadata::derive_client_metadata;
use crate::model::ViewStats;
use crate::views::{bearer_token, page_from_payload};

#[derive(Debug, Serialize)]
pub(super) struct Success {
    success: bool,
}

const SUCCESS: Success = Success { success: true };

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Health {
    status: &'static str,
    database_connected: bool,
}

/// Parse a JSON body whatever its content type.
///
/// Beacons (`navigator.sendBeacon`) post `text/plain`, and some clients send
/// no content type at all.
fn parse_body(body: &[u8], message: &str) -> Result<Value> {
    serde_json::from_slice(body).map_err(|_| Error::invalid_input(message))
}

pub(super) async fn health(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        database_connected: state.connection.is_connected(),
    })
}

pub(super) async fn record_visit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Success>> {
    let payload = parse_body(&body, "Invalid page parameter")?;
    let page = page_from_payload(&payload)?;

    state
        .views
        .record_visit(page, derive_client_metadata(&headers))
        .await?;

    Ok(Json(SUCCESS))
}

pub(super) async fn fetch_stats(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ViewStats>> {
    let stats = state.views.fetch_stats(bearer_token(&headers)).await?;
    Ok(Json(stats))
}

pub(super) async fn send_message(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<Success>> {
    let payload = parse_body(&body, "Missing fields")?;

    state.contact.send_payload(&payload).await?;

    Ok(Json(SUCCESS))
}
