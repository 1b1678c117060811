//! Core types for StateHub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Hex SHA-256 of state content, as reported in [`StateVersion::digest`]
pub fn content_digest(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(content))
}

/// Addresses one state object: a named state within a project
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateObjectKey {
    pub project_id: String,
    pub state_name: String,
}

impl StateObjectKey {
    pub fn new(project_id: impl Into<String>, state_name: impl Into<String>) -> Result<Self> {
        let project_id = project_id.into();
        let state_name = state_name.into();
        if project_id.trim().is_empty() {
            return Err(Error::InvalidKey("project id must not be empty".to_string()));
        }
        if state_name.trim().is_empty() {
            return Err(Error::InvalidKey("state name must not be empty".to_string()));
        }
        Ok(Self {
            project_id,
            state_name,
        })
    }
}

impl std::fmt::Display for StateObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.state_name)
    }
}

impl std::str::FromStr for StateObjectKey {
    type Err = Error;

    /// Parses `project/state`. The state name may itself contain slashes.
    fn from_str(s: &str) -> Result<Self> {
        let (project, name) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidKey(format!("expected <project>/<state>, got '{s}'")))?;
        Self::new(project, name)
    }
}

/// Metadata of one persisted snapshot. Content is transferred separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVersion {
    pub version: u64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub size_bytes: u64,
    /// Hex SHA-256 of the content
    #[serde(default)]
    pub digest: String,
}

/// Version metadata for one state object, most recent first.
///
/// Every constructor (including deserialization) sorts, so incoming order is
/// never trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<StateVersion>", into = "Vec<StateVersion>")]
pub struct VersionIndex(Vec<StateVersion>);

impl From<Vec<StateVersion>> for VersionIndex {
    fn from(versions: Vec<StateVersion>) -> Self {
        Self::sorted_descending(versions)
    }
}

impl From<VersionIndex> for Vec<StateVersion> {
    fn from(index: VersionIndex) -> Self {
        index.0
    }
}

impl VersionIndex {
    /// Builds an index, re-sorting descending regardless of input order.
    pub fn sorted_descending(mut versions: Vec<StateVersion>) -> Self {
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Self(versions)
    }

    pub fn current(&self) -> Option<&StateVersion> {
        self.0.first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StateVersion> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<StateVersion> {
        self.0
    }
}

impl IntoIterator for VersionIndex {
    type Item = StateVersion;
    type IntoIter = std::vec::IntoIter<StateVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Current snapshot plus older ones, descending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAndPrevious {
    pub current: Option<StateVersion>,
    pub previous: Vec<StateVersion>,
}

impl CurrentAndPrevious {
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

impl From<VersionIndex> for CurrentAndPrevious {
    fn from(index: VersionIndex) -> Self {
        let mut iter = index.into_iter();
        let current = iter.next();
        Self {
            current,
            previous: iter.collect(),
        }
    }
}

/// Free-form lock information passed through to the backend.
///
/// Follows the Terraform lock-info convention where `ID` identifies the lock
/// and `Who` names the holder, but no key is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockMetadata(pub BTreeMap<String, serde_json::Value>);

impl LockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn lock_id(&self) -> Option<&str> {
        self.get_str("ID").filter(|id| !id.is_empty())
    }

    pub fn who(&self) -> Option<&str> {
        self.get_str("Who").or_else(|| self.get_str("who"))
    }

    /// Whether `other` identifies the same lock holder: lock ids are compared
    /// when both carry one, otherwise the full maps must be equal.
    pub fn same_holder(&self, other: &LockMetadata) -> bool {
        match (self.lock_id(), other.lock_id()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An acquired lock, to be handed back on release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: StateObjectKey,
    pub metadata: LockMetadata,
}

/// Optional conditions attached to a write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePrecondition {
    /// Reject unless the current version equals this; 0 means "no versions yet"
    pub expected_version: Option<u64>,
    /// Lock id proving ownership when the object is locked
    pub lock_id: Option<String>,
}

impl WritePrecondition {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn expect_version(version: u64) -> Self {
        Self {
            expected_version: Some(version),
            lock_id: None,
        }
    }

    pub fn with_lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }
}
