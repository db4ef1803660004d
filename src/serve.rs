//! Purpose: Provide the HTTP/JSON REST server for the book inventory.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum server translating `/api/books` requests into record store operations.
//! Invariants: Error envelopes are `{"error": {kind, message, ...}}`; kinds map to fixed statuses.
//! Invariants: The store is opened once at boot and injected into handlers as a `LocalClient`.
//! Invariants: Store connection failures at boot are fatal.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use book_inventory::api::{BookInput, BookKey, Error, ErrorKind, LocalClient, StoreUri};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub store_uri: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    client: LocalClient,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    init_tracing();

    let (store_uri, cors) = match validate_config(&config) {
        Ok(validated) => validated,
        Err(err) => {
            tracing::error!(error = %err, "invalid server configuration");
            return Err(err);
        }
    };
    let max_body_bytes: usize = config.max_body_bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large")
    })?;

    let client = match LocalClient::open(&store_uri) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "store connection error");
            return Err(err);
        }
    };
    tracing::info!(store = %client.describe(), "store connected");

    let app = router(AppState { client })
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_hint("Pick a free port with --port or PORT.")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, "server listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/books", get(list_books).post(create_book))
        .route("/api/books/:id", put(update_book).delete(delete_book))
        .with_state(Arc::new(state))
}

fn validate_config(config: &ServeConfig) -> Result<(StoreUri, CorsLayer), Error> {
    let Some(raw) = config.store_uri.as_deref() else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("BOOKS_STORE_URI is not defined")
            .with_hint("Set BOOKS_STORE_URI or pass --store (e.g. memory: or ./data)."));
    };
    let store_uri = StoreUri::parse(raw)?;

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }
    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    let cors = cors_layer(&config.cors_allowed_origins)?;
    Ok((store_uri, cors))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, Error> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            let value = HeaderValue::from_str(origin.trim()).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid --cors-origin `{origin}`"))
                    .with_hint("Use an origin like http://localhost:3000.")
                    .with_source(err)
            })?;
            values.push(value);
        }
        AllowOrigin::list(values)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn list_books(State(state): State<Arc<AppState>>) -> Response {
    match state.client.list_books() {
        Ok(books) => Json(books).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_book(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BookInput>, JsonRejection>,
) -> Response {
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => return error_response(rejection_error(rejection)),
    };
    match state.client.create_from_input(input) {
        Ok(created) => {
            tracing::debug!(key = %created.key, "book created");
            Json(created).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn update_book(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    payload: Result<Json<BookInput>, JsonRejection>,
) -> Response {
    let key = match BookKey::parse(&id) {
        Ok(key) => key,
        Err(err) => return error_response(err),
    };
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => return error_response(rejection_error(rejection)),
    };
    match state.client.update_from_input(&key, input) {
        Ok(updated) => Json(updated).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_book(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let key = match BookKey::parse(&id) {
        Ok(key) => key,
        Err(err) => return error_response(err),
    };
    match state.client.delete_book(&key) {
        Ok(deleted) => Json(deleted).into_response(),
        Err(err) => error_response(err),
    }
}

fn rejection_error(rejection: JsonRejection) -> Error {
    let status = rejection.status();
    Error::new(ErrorKind::Usage)
        .with_message(format!("invalid request body: {}", rejection.body_text()))
        .with_hint(if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            "Send the body with Content-Type: application/json."
        } else {
            "Send a JSON object with title, author, and year."
        })
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::Corrupt | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        tracing::error!(error = %err, "store operation failed");
    } else {
        tracing::debug!(error = %err, "request rejected");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: err.kind().as_str().to_string(),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            key: err.key().map(str::to_string),
        },
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{ServeConfig, serve, status_for, validate_config};
    use axum::http::StatusCode;
    use book_inventory::api::{ErrorKind, StoreUri};

    fn config(store_uri: Option<&str>) -> ServeConfig {
        ServeConfig {
            bind: "127.0.0.1:0".parse().expect("bind"),
            store_uri: store_uri.map(str::to_string),
            cors_allowed_origins: Vec::new(),
            max_body_bytes: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn serve_without_store_uri_is_fatal() {
        let err = serve(config(None)).await.expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn serve_with_locked_store_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let db_dir = temp.path().join("book-inventory");
        let _held = book_inventory::api::FileStore::open(&db_dir).expect("hold lock");
        let uri = temp.path().to_string_lossy().to_string();
        let err = serve(config(Some(&uri))).await.expect_err("locked");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn memory_store_config_is_valid() {
        let (uri, _cors) = validate_config(&config(Some("memory:"))).expect("config ok");
        assert_eq!(uri, StoreUri::Memory);
    }

    #[test]
    fn body_limit_must_be_positive() {
        let mut config = config(Some("memory:"));
        config.max_body_bytes = 0;
        let err = validate_config(&config).expect_err("expected usage error");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn cors_origins_must_be_header_safe() {
        let mut config = config(Some("memory:"));
        config.cors_allowed_origins = vec!["http://localhost:3000".to_string()];
        validate_config(&config).expect("valid origin");
        config.cors_allowed_origins = vec!["http://bad\norigin".to_string()];
        let err = validate_config(&config).expect_err("invalid origin");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn error_kinds_map_to_distinct_statuses() {
        assert_eq!(status_for(ErrorKind::Usage), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Permission), StatusCode::FORBIDDEN);
        for kind in [ErrorKind::Internal, ErrorKind::Io, ErrorKind::Corrupt] {
            assert_eq!(status_for(kind), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
