//! HTTP wire format shared by the client transport and the reference backend
//!
//! State content is sent as the raw request/response body. Everything else is
//! JSON.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{LockMetadata, StateObjectKey, StateVersion};

pub const API_PREFIX: &str = "/api/v1";

/// Response header carrying the version number of a returned state body
pub const STATE_VERSION_HEADER: &str = "x-state-version";

/// Custom HTTP methods for the lock protocol
pub const LOCK_METHOD: &str = "LOCK";
pub const UNLOCK_METHOD: &str = "UNLOCK";

/// Error codes carried in [`ErrorBody::code`]
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const VERSION_CONFLICT: &str = "version_conflict";
    pub const LOCK_CONFLICT: &str = "lock_conflict";
    pub const BAD_REQUEST: &str = "bad_request";
}

/// Path of a state object, relative to the backend base URL
pub fn state_path(key: &StateObjectKey) -> String {
    format!(
        "{}/projects/{}/states/{}",
        API_PREFIX,
        urlencoding::encode(&key.project_id),
        urlencoding::encode(&key.state_name)
    )
}

/// Path of the version listing of a state object
pub fn versions_path(key: &StateObjectKey) -> String {
    format!("{}/versions", state_path(key))
}

/// Query parameters of read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Query parameters of delete
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
}

/// Query parameters of write
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionListResponse {
    pub versions: Vec<StateVersion>,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<LockMetadata>,
}

impl ErrorBody {
    pub fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            current_version: None,
            holder: None,
        }
    }
}

impl From<&Error> for ErrorBody {
    fn from(e: &Error) -> Self {
        match e {
            Error::NotFound { .. } => ErrorBody::new(codes::NOT_FOUND, e.to_string()),
            Error::Unauthorized(_) => ErrorBody::new(codes::UNAUTHORIZED, e.to_string()),
            Error::VersionConflict { current, .. } => ErrorBody {
                current_version: *current,
                ..ErrorBody::new(codes::VERSION_CONFLICT, e.to_string())
            },
            Error::LockConflict { holder, .. } => ErrorBody {
                holder: holder.clone(),
                ..ErrorBody::new(codes::LOCK_CONFLICT, e.to_string())
            },
            _ => ErrorBody::new(codes::BAD_REQUEST, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_path_encodes_segments() {
        let key = StateObjectKey::new("proj 1", "env/prod").unwrap();
        assert_eq!(state_path(&key), "/api/v1/projects/proj%201/states/env%2Fprod");
        assert_eq!(
            versions_path(&key),
            "/api/v1/projects/proj%201/states/env%2Fprod/versions"
        );
    }

    #[test]
    fn test_error_body_carries_conflict_details() {
        let err = Error::VersionConflict {
            key: "p/main".into(),
            expected: 5,
            current: Some(6),
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, codes::VERSION_CONFLICT);
        assert_eq!(body.current_version, Some(6));

        let json = serde_json::to_value(ErrorBody::new(codes::NOT_FOUND, "gone")).unwrap();
        assert!(json.get("holder").is_none());
    }
}
