//! HTTP state backend client

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use statehub_common::wire::{
    self, DeleteQuery, ErrorBody, VersionListResponse, VersionQuery, WriteQuery, LOCK_METHOD, UNLOCK_METHOD,
};
use statehub_common::{
    Error, LockHandle, LockMetadata, Result, StateObjectKey, StateVersion, VersionIndex,
    WritePrecondition,
};

use crate::config::ClientConfig;
use crate::session::SessionContext;
use crate::transport::StateTransport;

/// Client for a StateHub backend over HTTP
pub struct HttpStateTransport {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    session: Arc<SessionContext>,
}

/// What a request was about, for turning failure statuses into errors
#[derive(Default)]
struct CallContext {
    version: Option<u64>,
    expected_version: Option<u64>,
}

impl HttpStateTransport {
    /// Create a new client. `timeout` bounds every call.
    pub fn new(endpoint: &str, timeout: Duration, session: Arc<SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            session,
        })
    }

    pub fn from_config(config: &ClientConfig, session: Arc<SessionContext>) -> Result<Self> {
        config.validate()?;
        Self::new(&config.endpoint, config.timeout(), session)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Check if the backend is answering
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("health check failed: {}", e);
                false
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let credentials = self.session.credentials()?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.endpoint, path))
            .bearer_auth(credentials.token))
    }

    /// Send and classify: 2xx responses are returned, everything else becomes
    /// a taxonomy error.
    async fn execute(
        &self,
        key: &StateObjectKey,
        builder: RequestBuilder,
        ctx: CallContext,
    ) -> Result<Response> {
        let resp = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        Err(error_from_status(key, status, &body, &ctx))
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            Error::Network(e.to_string())
        }
    }
}

fn custom_method(name: &str) -> Result<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| Error::Network(e.to_string()))
}

/// Map a non-2xx response onto the error taxonomy
fn error_from_status(
    key: &StateObjectKey,
    status: StatusCode,
    body: &[u8],
    ctx: &CallContext,
) -> Error {
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect());

    match status {
        StatusCode::NOT_FOUND => Error::NotFound {
            key: key.to_string(),
            version: ctx.version,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        StatusCode::PRECONDITION_FAILED => Error::VersionConflict {
            key: key.to_string(),
            expected: ctx.expected_version.unwrap_or_default(),
            current: parsed.and_then(|b| b.current_version),
        },
        StatusCode::CONFLICT | StatusCode::LOCKED => Error::LockConflict {
            key: key.to_string(),
            holder: parsed.and_then(|b| b.holder),
        },
        other => Error::Network(format!("unexpected status {}: {}", other, message)),
    }
}

#[async_trait]
impl StateTransport for HttpStateTransport {
    async fn read_state(&self, key: &StateObjectKey, version: Option<u64>) -> Result<Vec<u8>> {
        debug!("read {} version {:?}", key, version);
        let builder = self
            .request(Method::GET, &wire::state_path(key))?
            .query(&VersionQuery { version });
        let ctx = CallContext {
            version,
            ..Default::default()
        };
        let resp = self.execute(key, builder, ctx).await?;
        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(body.to_vec())
    }

    async fn list_versions(&self, key: &StateObjectKey) -> Result<VersionIndex> {
        debug!("list versions of {}", key);
        let builder = self.request(Method::GET, &wire::versions_path(key))?;
        let resp = self.execute(key, builder, CallContext::default()).await?;
        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let list: VersionListResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Network(format!("invalid version list: {}", e)))?;
        Ok(VersionIndex::from(list.versions))
    }

    async fn write_state(
        &self,
        key: &StateObjectKey,
        content: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<StateVersion> {
        debug!(
            "write {} ({} bytes, expected version {:?})",
            key,
            content.len(),
            precondition.expected_version
        );
        let query = WriteQuery {
            expected_version: precondition.expected_version,
            lock_id: precondition.lock_id.clone(),
        };
        let builder = self
            .request(Method::POST, &wire::state_path(key))?
            .query(&query)
            .body(content);
        let ctx = CallContext {
            expected_version: precondition.expected_version,
            ..Default::default()
        };
        let resp = self.execute(key, builder, ctx).await?;
        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Network(format!("invalid write response: {}", e)))
    }

    async fn delete_state_locked(
        &self,
        key: &StateObjectKey,
        version: Option<u64>,
        lock_id: Option<&str>,
    ) -> Result<()> {
        debug!("delete {} version {:?}", key, version);
        let query = DeleteQuery {
            version,
            lock_id: lock_id.map(str::to_string),
        };
        let builder = self
            .request(Method::DELETE, &wire::state_path(key))?
            .query(&query);
        let ctx = CallContext {
            version,
            ..Default::default()
        };
        match self.execute(key, builder, ctx).await {
            Ok(_) => Ok(()),
            // Deletes may be retried blindly, so a missing target is success
            Err(e) if e.is_not_found() => {
                debug!("delete of {} found nothing: {}", key, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn acquire_lock(&self, key: &StateObjectKey, metadata: &LockMetadata) -> Result<LockHandle> {
        debug!("lock {}", key);
        let builder = self
            .request(custom_method(LOCK_METHOD)?, &wire::state_path(key))?
            .json(metadata);
        self.execute(key, builder, CallContext::default()).await?;
        Ok(LockHandle {
            key: key.clone(),
            metadata: metadata.clone(),
        })
    }

    async fn release_lock(&self, key: &StateObjectKey, metadata: &LockMetadata) -> Result<()> {
        debug!("unlock {}", key);
        let builder = self
            .request(custom_method(UNLOCK_METHOD)?, &wire::state_path(key))?
            .json(metadata);
        self.execute(key, builder, CallContext::default()).await?;
        Ok(())
    }
}
