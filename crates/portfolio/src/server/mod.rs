//! HTTP server for the portfolio backend.
//!
//! Exposes the view tracker and the contact relay over JSON, with CORS for
//! the site's origin and graceful shutdown on Ctrl+C or SIGTERM.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::mail::ContactRelay;
use crate::views::ViewTracker;

/// Route for recording visits (POST) and reading stats (GET).
pub const VIEWS_ROUTE: &str = "/api/views-monitor";

/// Route for contact form submissions.
pub const SEND_MESSAGE_ROUTE: &str = "/api/send-message";

/// Route for the liveness probe.
pub const HEALTH_ROUTE: &str = "/health";

/// Everything a request handler needs. Built once by the composition root.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Database handle owner, shared with the view tracker.
    pub connection: Arc<ConnectionManager>,
    /// View tracking service.
    pub views: ViewTracker,
    /// Contact relay.
    pub contact: ContactRelay,
}

/// Shared application state.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire up the services described by `config`.
    ///
    /// No connection is made here; the store opens on first use.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the mail relay cannot be set up.
    pub fn from_config(config: &Config) -> Result<SharedState> {
        let connection = Arc::new(ConnectionManager::new(config.database.clone()));
        let views = ViewTracker::new(Arc::clone(&connection), config.stats.secret.clone());
        let contact = ContactRelay::from_config(&config.mail)?;

        if config.stats.secret.is_none() {
            warn!("stats.secret is not set; stats requests will be rejected");
        }

        Ok(Arc::new(Self {
            connection,
            views,
            contact,
        }))
    }
}

/// Build the application router.
pub fn build_router(state: SharedState, allow_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route(HEALTH_ROUTE, get(handlers::health))
        .route(
            VIEWS_ROUTE,
            post(handlers::record_visit).get(handlers::fetch_stats),
        )
        .route(SEND_MESSAGE_ROUTE, post(handlers::send_message));

    if let Some(cors) = build_cors_layer(allow_origins) {
        router = router.layer(cors);
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration is unusable or the listener cannot
/// be bound.
pub async fn serve(config: &Config) -> Result<()> {
    info!("Initializing state...");
    let state = AppState::from_config(config)?;
    let app = build_router(state, &config.server.allow_origins);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let normalized = origin.trim().trim_end_matches('/');
            match HeaderValue::from_str(normalized) {
                Ok(value) if !normalized.is_empty() => Some(value),
                _ => {
                    warn!(%origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .max_age(Duration::from_secs(60 * 60)),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => error!(%err, "Failed to install Ctrl+C handler"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(%err, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// JSON body for failed requests.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(err = %self, "Request failed");
        }

        let body = Json(ErrorBody {
            error: self.public_message(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_disabled_without_origins() {
        assert!(build_cors_layer(&[]).is_none());
    }

    #[test]
    fn test_cors_ignores_invalid_origins() {
        let origins = vec!["  ".to_string(), "bad\norigin".to_string()];
        assert!(build_cors_layer(&origins).is_none());
    }

    #[test]
    fn test_cors_enabled_with_origin() {
        let origins = vec!["https://example.com/".to_string()];
        assert!(build_cors_layer(&origins).is_some());
    }

    #[test]
    fn test_state_from_default_config() {
        let state = AppState::from_config(&Config::default()).unwrap();
        assert!(!state.connection.is_connected());
    }

    #[test]
    fn test_error_response_status() {
        let response = Error::Unauthorized.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);

        let response = Error::configuration("database url is not set").into_response();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
