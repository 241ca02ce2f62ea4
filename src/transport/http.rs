//! HTTP transport for the query router.
//!
//! Routes:
//! - `GET /databases`: registered databases, without credentials
//! - `GET /tables-metadata?groupName=&groupType=`: tables and columns of one database
//! - `GET /query?query=&groupType=[&groupName=]`: one database, or the whole group
//!   when `groupName` is absent
//!
//! Query failures are part of the 200 response body. Only a malformed request
//! (missing parameters, unknown metadata target) is answered with 400.

use crate::db::DatabaseStore;
use crate::error::{DbError, DbResult};
use crate::transport::Transport;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

/// HTTP transport implementation.
pub struct HttpTransport {
    store: DatabaseStore,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// Deadline applied to each query request
    query_timeout: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared database registry
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    /// * `query_timeout` - Deadline after which a request's queries are cancelled
    pub fn new(
        store: DatabaseStore,
        host: impl Into<String>,
        port: u16,
        query_timeout: Duration,
    ) -> Self {
        Self {
            store,
            host: host.into(),
            port,
            query_timeout,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let app = router(self.store.clone(), self.query_timeout);

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        info!(address = %bind_addr, "HTTP server listening");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_signal())
            .await;

        info!("Closing database connections");
        self.store.close_all().await;

        match result {
            Ok(()) => {
                info!("HTTP server stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "HTTP server error");
                Err(DbError::internal(format!("HTTP server error: {}", e)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

struct AppState {
    store: DatabaseStore,
    query_timeout: Duration,
}

/// Build the router over `store`.
pub fn router(store: DatabaseStore, query_timeout: Duration) -> Router {
    let state = Arc::new(AppState {
        store,
        query_timeout,
    });
    Router::new()
        .route("/databases", get(list_databases))
        .route("/tables-metadata", get(tables_metadata))
        .route("/query", get(run_query))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TablesParams {
    #[serde(rename = "groupName")]
    group_name: Option<String>,
    #[serde(rename = "groupType")]
    group_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    query: Option<String>,
    #[serde(rename = "groupName")]
    group_name: Option<String>,
    #[serde(rename = "groupType")]
    group_type: Option<String>,
}

async fn list_databases(State(state): State<Arc<AppState>>) -> Response {
    Json(state.store.database_items().await).into_response()
}

async fn tables_metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TablesParams>,
) -> Response {
    let Some(group_name) = required(params.group_name) else {
        return bad_request("missing required parameter: groupName");
    };
    let Some(group_type) = required(params.group_type) else {
        return bad_request("missing required parameter: groupType");
    };

    let (cancel, _guard) = request_token(state.query_timeout);
    match state
        .store
        .list_tables(&group_name, &group_type, &cancel)
        .await
    {
        Ok(tables) => Json(tables).into_response(),
        Err(e) => {
            if !e.is_not_found() {
                warn!(
                    group_name = %group_name,
                    group_type = %group_type,
                    error = %e,
                    "Listing tables failed"
                );
            }
            bad_request(e.to_string())
        }
    }
}

async fn run_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Response {
    let Some(sql) = required(params.query) else {
        return bad_request("missing required parameter: query");
    };
    let Some(group_type) = required(params.group_type) else {
        return bad_request("missing required parameter: groupType");
    };

    let (cancel, _guard) = request_token(state.query_timeout);
    match required(params.group_name) {
        Some(group_name) => {
            let result = state
                .store
                .query_database(&group_name, &group_type, &sql, &cancel)
                .await;
            Json(result).into_response()
        }
        None => {
            let results = state.store.query_group(&group_type, &sql, &cancel).await;
            Json(results).into_response()
        }
    }
}

fn required(param: Option<String>) -> Option<String> {
    param.filter(|p| !p.is_empty())
}

fn bad_request(message: impl Into<String>) -> Response {
    let message = message.into();
    debug!(error = %message, "Rejected request");
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Token cancelled when the returned guard drops (request finished or client gone)
/// or when `timeout` elapses, whichever comes first.
fn request_token(timeout: Duration) -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let deadline = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                debug!(timeout_secs = timeout.as_secs(), "Query deadline reached");
                deadline.cancel();
            }
            _ = deadline.cancelled() => {}
        }
    });
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
