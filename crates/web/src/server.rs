//! Web server implementation
//!
//! Exposes the state store over HTTP:
//!
//! - `GET    /api/v1/projects/:project/states/:name[?version=N]`  read content
//! - `GET    /api/v1/projects/:project/states/:name/versions`     list versions
//! - `POST   /api/v1/projects/:project/states/:name`              write a new version
//! - `DELETE /api/v1/projects/:project/states/:name[?version=N]`  delete
//! - `LOCK` / `UNLOCK` on the state path                           lock protocol

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use statehub_common::wire::{
    codes, DeleteQuery, ErrorBody, VersionListResponse, VersionQuery, WriteQuery, LOCK_METHOD,
    STATE_VERSION_HEADER, UNLOCK_METHOD,
};
use statehub_common::{Error, LockMetadata, StateObjectKey, WritePrecondition};

use crate::auth::{require_auth, AuthenticatedUser, TokenTable};
use crate::store::StateStore;

/// Web server configuration
#[derive(Clone, Debug)]
pub struct WebServerConfig {
    pub addr: SocketAddr,
    /// Authentication policy for the API
    pub auth: WebAuth,
    /// Cap on request bodies; unlimited when `None`
    pub max_body_bytes: Option<usize>,
}

#[derive(Clone, Debug)]
pub enum WebAuth {
    /// Fixed set of bearer tokens
    Tokens(TokenTable),
    /// Generate a random ephemeral token at startup and print it once.
    DevRandom,
}

impl WebServerConfig {
    /// Build configuration from `STATEHUB_WEB_ADDR` and `STATEHUB_WEB_TOKENS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let addr: SocketAddr = std::env::var("STATEHUB_WEB_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let auth = match std::env::var("STATEHUB_WEB_TOKENS") {
            Ok(entries) if !entries.trim().is_empty() => {
                let table = TokenTable::parse(&entries)
                    .map_err(|e| anyhow::anyhow!("invalid STATEHUB_WEB_TOKENS: {}", e))?;
                WebAuth::Tokens(table)
            }
            _ => WebAuth::DevRandom,
        };

        let max_body_bytes = match std::env::var("STATEHUB_WEB_MAX_BODY_BYTES") {
            Ok(v) if !v.trim().is_empty() => Some(
                v.trim()
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid STATEHUB_WEB_MAX_BODY_BYTES: {}", e))?,
            ),
            _ => None,
        };

        Ok(Self {
            addr,
            auth,
            max_body_bytes,
        })
    }
}

/// Shared handler state
pub struct AppState {
    pub store: StateStore,
    pub tokens: TokenTable,
    /// Request body cap; state content is otherwise unbounded
    pub max_body_bytes: Option<usize>,
}

impl AppState {
    pub fn new(tokens: TokenTable) -> Self {
        Self {
            store: StateStore::new(),
            tokens,
            max_body_bytes: None,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    fn from_auth(auth: &WebAuth) -> Self {
        let tokens = match auth {
            WebAuth::Tokens(table) => table.clone(),
            WebAuth::DevRandom => {
                let token = hex::encode(rand::random::<[u8; 16]>());
                eprintln!("STATEHUB_WEB_TOKENS (dev): dev:{}", token);
                let mut table = TokenTable::default();
                table.insert("dev", token);
                table
            }
        };
        Self::new(tokens)
    }
}

/// Maps the error taxonomy onto HTTP statuses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::VersionConflict { .. } => StatusCode::PRECONDITION_FAILED,
            Error::LockConflict { .. } => StatusCode::LOCKED,
            Error::InvalidKey(_) | Error::MalformedContent(_) | Error::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

fn state_key(project: String, name: String) -> Result<StateObjectKey, ApiError> {
    Ok(StateObjectKey::new(project, name)?)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": statehub_common::VERSION,
    }))
}

async fn read_state_handler(
    State(state): State<Arc<AppState>>,
    Path((project, name)): Path<(String, String)>,
    Query(query): Query<VersionQuery>,
) -> Result<Response, ApiError> {
    let key = state_key(project, name)?;
    let (meta, content) = state.store.read(&key, query.version)?;
    debug!("read {} version {}", key, meta.version);

    let mut response = (StatusCode::OK, content).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(STATE_VERSION_HEADER, HeaderValue::from(meta.version));
    Ok(response)
}

async fn list_versions_handler(
    State(state): State<Arc<AppState>>,
    Path((project, name)): Path<(String, String)>,
) -> Result<Json<VersionListResponse>, ApiError> {
    let key = state_key(project, name)?;
    let versions = state.store.list(&key);
    Ok(Json(VersionListResponse { versions }))
}

async fn write_state_handler(
    State(state): State<Arc<AppState>>,
    Path((project, name)): Path<(String, String)>,
    Query(query): Query<WriteQuery>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = state_key(project, name)?;
    let precondition = WritePrecondition {
        expected_version: query.expected_version,
        lock_id: query.lock_id,
    };
    let meta = state.store.write(&key, body, &precondition, &user)?;
    Ok((StatusCode::OK, Json(meta)).into_response())
}

async fn delete_state_handler(
    State(state): State<Arc<AppState>>,
    Path((project, name)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    let key = state_key(project, name)?;
    let removed = state.store.delete(&key, query.version, query.lock_id.as_deref())?;
    if removed == 0 {
        debug!("delete of {} ({:?}) matched nothing", key, query.version);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handles the non-standard LOCK and UNLOCK methods on the state path.
async fn lock_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path((project, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = state_key(project, name)?;
    let metadata: LockMetadata = if body.is_empty() {
        LockMetadata::default()
    } else {
        serde_json::from_slice(&body).map_err(Error::from)?
    };

    match method.as_str() {
        LOCK_METHOD => {
            state.store.lock(&key, metadata)?;
            Ok(StatusCode::OK.into_response())
        }
        UNLOCK_METHOD => {
            state.store.unlock(&key, &metadata)?;
            Ok(StatusCode::OK.into_response())
        }
        other => {
            warn!("unsupported method {} on {}", other, key);
            Ok((
                StatusCode::METHOD_NOT_ALLOWED,
                Json(ErrorBody::new(
                    codes::BAD_REQUEST,
                    format!("method {other} not allowed"),
                )),
            )
                .into_response())
        }
    }
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(codes::NOT_FOUND, "no such route")),
    )
}

/// Create router
pub fn router(state: Arc<AppState>) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.clone(), require_auth);
    let body_limit = match state.max_body_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    let protected_routes = Router::new()
        .route(
            "/api/v1/projects/:project/states/:name",
            get(read_state_handler)
                .post(write_state_handler)
                .delete(delete_state_handler)
                .fallback(lock_handler),
        )
        .route(
            "/api/v1/projects/:project/states/:name/versions",
            get(list_versions_handler),
        )
        .layer(body_limit)
        .layer(auth_layer);

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected_routes)
        .fallback(not_found_handler)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener until the process exits
pub async fn serve_on(listener: tokio::net::TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    info!("State backend listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind `cfg.addr` and serve
pub async fn serve(cfg: WebServerConfig) -> anyhow::Result<()> {
    let mut state = AppState::from_auth(&cfg.auth);
    state.max_body_bytes = cfg.max_body_bytes;
    let state = Arc::new(state);
    let listener = tokio::net::TcpListener::bind(cfg.addr).await?;
    serve_on(listener, state).await
}
