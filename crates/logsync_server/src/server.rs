//! HTTP layer over the request handlers.
//!
//! This layer only extracts parameters, enforces the optional API token
//! and maps [`ServerError`] to status codes; all sync semantics live in
//! [`crate::handler`].

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler, UploadRequest};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use logsync_protocol::{headers, ChangeLogEntry, TransactionSummary};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

/// Maximum accepted upload size in bytes.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Wraps [`ServerError`] for axum's response conversion.
struct ApiError(ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.0.to_string()).into_response()
    }
}

fn bad_request(message: impl std::fmt::Display) -> ApiError {
    ApiError(ServerError::validation(message.to_string()))
}

/// Builds the router for all sync and operator endpoints.
pub fn router(handler: RequestHandler) -> Router {
    Router::new()
        .route("/transactions", get(get_transactions))
        .route(
            "/transactions/:transaction_id/changes",
            get(get_transaction_changes),
        )
        .route("/:graph/changes", get(get_changes))
        .route("/:graph/upload", post(upload_file))
        .route("/:graph/delete/:file_id", delete(delete_file))
        .route("/:graph/content/:file_id", get(get_content))
        .layer(middleware::from_fn_with_state(
            handler.clone(),
            require_api_token,
        ))
        .layer(middleware::from_fn(correlation_scope))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(handler)
}

/// Opens the persistent state and serves the API until shutdown.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let context = Arc::new(HandlerContext::open(config.clone())?);
    let handler = RequestHandler::new(context);
    let app = router(handler);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| ServerError::storage(format!("cannot bind {addr}: {err}")))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .await
        .map_err(|err| ServerError::storage(format!("server failed: {err}")))
}

async fn get_changes(
    State(handler): State<RequestHandler>,
    Path(graph): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<ChangeLogEntry>>, ApiError> {
    let since = match params.get("since") {
        None => 0,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| bad_request("could not parse since"))?,
    };
    Ok(Json(handler.changes(&graph, since)))
}

async fn upload_file(
    State(handler): State<RequestHandler>,
    Path(graph): Path<String>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut transaction_id = String::new();
    let mut operation = String::new();
    let mut modified_date: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("expected multipart body: {err}")))?
    {
        match field.name().map(str::to_owned).as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| bad_request(format!("could not read file part: {err}")))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("ta-id") => {
                transaction_id = field
                    .text()
                    .await
                    .map_err(|err| bad_request(format!("could not read ta-id: {err}")))?;
            }
            Some("operation") => {
                operation = field
                    .text()
                    .await
                    .map_err(|err| bad_request(format!("could not read operation: {err}")))?;
            }
            Some("modified-date") => {
                modified_date = Some(field.text().await.map_err(|err| {
                    bad_request(format!("could not read modified-date: {err}"))
                })?);
            }
            _ => {}
        }
    }

    let (file_id, content) = file.ok_or_else(|| bad_request("missing file part"))?;
    if file_id.is_empty() {
        return Err(bad_request("file part carries no filename"));
    }

    handler.upload(
        &graph,
        UploadRequest {
            file_id,
            content,
            transaction_id,
            operation,
            modified_date,
        },
    )?;
    Ok(StatusCode::CREATED)
}

async fn delete_file(
    State(handler): State<RequestHandler>,
    Path((graph, file_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode, ApiError> {
    let transaction_id = params.get("ta_id").cloned().unwrap_or_default();
    let modified_millis = match params.get("modified_date") {
        None => None,
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| bad_request("could not parse modified_date"))?,
        ),
    };

    handler.delete(&graph, &file_id, &transaction_id, modified_millis)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_content(
    State(handler): State<RequestHandler>,
    Path((graph, file_id)): Path<(String, String)>,
) -> Result<Vec<u8>, ApiError> {
    Ok(handler.content(&graph, &file_id)?)
}

async fn get_transactions(
    State(handler): State<RequestHandler>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<TransactionSummary>> {
    let (page, size) = page_params(&params);
    Json(handler.transactions(page, size))
}

async fn get_transaction_changes(
    State(handler): State<RequestHandler>,
    Path(transaction_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<ChangeLogEntry>> {
    let (page, size) = page_params(&params);
    Json(handler.transaction_changes(&transaction_id, page, size))
}

/// Reads pagination parameters leniently; junk falls back to defaults.
fn page_params(params: &HashMap<String, String>) -> (Option<i64>, Option<i64>) {
    let page = params.get("page").and_then(|p| p.parse().ok());
    let size = params.get("size").and_then(|s| s.parse().ok());
    (page, size)
}

async fn require_api_token(
    State(handler): State<RequestHandler>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = handler.context().config.api_token.as_deref() {
        let provided = request
            .headers()
            .get(headers::API_TOKEN)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected) {
            return ApiError(ServerError::Unauthorized).into_response();
        }
    }
    next.run(request).await
}

/// Attaches the correlation headers to the request span. Logging only.
async fn correlation_scope(request: Request, next: Next) -> Response {
    let transaction = header_string(&request, headers::TRANSACTION_ID);
    let request_id = header_string(&request, headers::REQUEST_ID);

    let span = tracing::info_span!(
        "request",
        transaction = transaction.as_deref().unwrap_or(""),
        request_id = request_id.as_deref().unwrap_or(""),
    );
    next.run(request).instrument(span).await
}

fn header_string(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
