//!
//! # Backend Collaborators
//!
//! The application never owns credentials or data: an identity provider issues
//! sessions and a realtime record store holds every record. This module defines
//! the two seams (`IdentityProvider`, `RecordStore`) together with the values
//! that cross them (`Principal`, `DbPath`, `Snapshot`, `Query`) and their error
//! codes. `identity` and `memory` provide in-process implementations used by the
//! local shell and by the tests.

pub mod identity;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

pub use identity::LocalIdentityProvider;
pub use memory::MemoryStore;

/// An authenticated identity as the identity provider knows it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-assigned unique identifier.
    pub uid: String,
    pub email: String,
    /// Bearer token proving the session, verified by `IdentityProvider::verify_id_token`.
    pub id_token: String,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .finish()
    }
}

/// Error codes reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    /// The provider could not be reached.
    Network(String),
    Other(String),
}

impl ProviderError {
    /// The provider's wire code, e.g. `auth/wrong-password`.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::EmailAlreadyInUse => "auth/email-already-in-use",
            ProviderError::InvalidEmail => "auth/invalid-email",
            ProviderError::WeakPassword => "auth/weak-password",
            ProviderError::UserNotFound => "auth/user-not-found",
            ProviderError::WrongPassword => "auth/wrong-password",
            ProviderError::InvalidCredential => "auth/invalid-credential",
            ProviderError::Network(_) => "auth/network-request-failed",
            ProviderError::Other(_) => "auth/internal-error",
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::Network(msg) | ProviderError::Other(msg) => {
                write!(f, "{}: {}", self.code(), msg)
            }
            _ => write!(f, "{}", self.code()),
        }
    }
}

/// Failures reported by the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store's security rules rejected the operation.
    PermissionDenied(String),
    InvalidPath(String),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::PermissionDenied(path) => write!(f, "Permission denied at '{}'", path),
            StoreError::InvalidPath(path) => write!(f, "Invalid path '{}'", path),
            StoreError::Unavailable(msg) => write!(f, "Record store unavailable: {}", msg),
        }
    }
}

/// A validated location in the record store, e.g. `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbPath {
    segments: Vec<String>,
}

impl DbPath {
    /// The root of the store.
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Parses a slash-separated path. Leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let mut segments = Vec::new();
        for segment in path.trim_matches('/').split('/') {
            if segment.is_empty() && path.trim_matches('/').is_empty() {
                break;
            }
            if !is_valid_key(segment) {
                return Err(StoreError::InvalidPath(path.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Appends one key. The key is validated like any other segment.
    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidPath(format!("{}/{}", self, key)));
        }
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn starts_with(&self, prefix: &DbPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for DbPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 768
        && !key
            .chars()
            .any(|c| matches!(c, '.' | '$' | '#' | '[' | ']' | '/') || c.is_control())
}

/// Server-side filter: children whose `child` field equals `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub child: String,
    pub equal_to: Value,
}

impl Query {
    pub fn order_by_child(child: &str) -> QueryBuilder {
        QueryBuilder {
            child: child.to_string(),
        }
    }

    /// Keeps the matching children of `value`. Non-object values match nothing.
    pub fn apply(&self, value: Option<&Value>) -> Option<Value> {
        let children = value?.as_object()?;
        let matches: Map<String, Value> = children
            .iter()
            .filter(|(_, child)| child.get(&self.child) == Some(&self.equal_to))
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect();
        if matches.is_empty() {
            None
        } else {
            Some(Value::Object(matches))
        }
    }
}

pub struct QueryBuilder {
    child: String,
}

impl QueryBuilder {
    pub fn equal_to(self, value: impl Into<Value>) -> Query {
        Query {
            child: self.child,
            equal_to: value.into(),
        }
    }
}

/// An immutable view of the data at one location.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    path: DbPath,
    value: Option<Value>,
}

impl Snapshot {
    pub fn new(path: DbPath, value: Option<Value>) -> Self {
        Self { path, value }
    }

    pub fn path(&self) -> &DbPath {
        &self.path
    }

    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Child snapshots in key order. Keys in the store are always valid path
    /// segments, so children never fail to build.
    pub fn children(&self) -> Vec<Snapshot> {
        let Some(Value::Object(map)) = &self.value else {
            return Vec::new();
        };
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
            .into_iter()
            .map(|(key, value)| {
                let mut segments = self.path.segments.clone();
                segments.push(key.clone());
                Snapshot::new(DbPath { segments }, Some(value.clone()))
            })
            .collect()
    }
}

/// A live query: every item is the complete current result, never a diff.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, StoreError>>;

/// The hosted identity provider, reduced to what the application uses.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an email/password credential and signs the new user in.
    async fn create_user(&self, email: &str, password: &str) -> Result<Principal, ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Deletes the credential of the signed-in user and ends the session.
    async fn delete_current_user(&self) -> Result<(), ProviderError>;

    fn current_user(&self) -> Option<Principal>;

    /// Auth-state notifications: the receiver always holds the current principal.
    fn auth_state(&self) -> watch::Receiver<Option<Principal>>;

    /// Checks a bearer token and returns the principal it belongs to.
    fn verify_id_token(&self, token: &str) -> Result<Principal, ProviderError>;
}

/// The hosted realtime record store: a JSON tree addressed by path.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, path: &DbPath) -> Result<Snapshot, StoreError>;

    /// Replaces the value at `path`. Writing `null` removes it.
    async fn set(&self, path: &DbPath, value: Value) -> Result<(), StoreError>;

    /// Writes each field as a child of `path`, leaving other children alone.
    async fn update(&self, path: &DbPath, fields: Map<String, Value>) -> Result<(), StoreError>;

    async fn remove(&self, path: &DbPath) -> Result<(), StoreError>;

    /// Replaces the value at `path` with what `apply` returns for the current
    /// one, with no other write in between. `None` aborts without writing.
    /// Returns whether a value was written.
    async fn transaction(
        &self,
        path: &DbPath,
        apply: &mut (dyn for<'v> FnMut(Option<&'v Value>) -> Option<Value> + Send),
    ) -> Result<bool, StoreError>;

    /// Reserves a new, time-ordered child location under `path`.
    fn push(&self, path: &DbPath) -> DbPath;

    /// Opens a live query. Dropping the stream cancels it.
    fn watch(&self, path: &DbPath, query: Option<Query>) -> SnapshotStream;
}
