//! Bearer-token authentication middleware for Axum.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use statehub_common::wire::{codes, ErrorBody};

use crate::server::AppState;

/// Extension that holds the authenticated user name
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub String);

/// Token table: bearer token -> user name
#[derive(Clone, Debug, Default)]
pub struct TokenTable {
    tokens: HashMap<String, String>,
}

impl TokenTable {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Parse `user:token,user:token`. Blank entries are skipped.
    pub fn parse(entries: &str) -> Result<Self, String> {
        let mut tokens = HashMap::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (user, token) = entry
                .split_once(':')
                .ok_or_else(|| format!("expected user:token, got '{entry}'"))?;
            if user.trim().is_empty() || token.trim().is_empty() {
                return Err(format!("empty user or token in '{entry}'"));
            }
            tokens.insert(token.trim().to_string(), user.trim().to_string());
        }
        Ok(Self { tokens })
    }

    pub fn insert(&mut self, user: impl Into<String>, token: impl Into<String>) {
        self.tokens.insert(token.into(), user.into());
    }

    pub fn user_for(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn unauthorized(msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new(codes::UNAUTHORIZED, msg)),
    )
        .into_response()
}

/// Middleware that requires a known bearer token
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized("Missing or invalid authorization header");
    };

    match state.tokens.user_for(token) {
        Some(user) => {
            debug!("authenticated {} {} as {}", request.method(), request.uri().path(), user);
            let user = AuthenticatedUser(user.to_string());
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("Invalid token"),
    }
}
