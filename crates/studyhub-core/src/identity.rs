//! Connection and user identifiers.
//!
//! A connection is either anonymous or identified as exactly one user. The
//! identity is decided once, when the connection opens, from credentials the
//! auth layer verified. Nothing a client sends afterwards can change it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Study group primary key.
pub type GroupId = i64;

/// Unique identifier for an open connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an existing connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::new_v4().simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Authenticated user identifier, as issued by the identity provider.
///
/// Compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity bound to a connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    /// No verified credentials. The connection may stay open but receives
    /// no routed traffic.
    #[default]
    Anonymous,
    /// Verified as the given user.
    Identified(UserId),
}

impl Identity {
    /// Build an identity from an optional, already verified, user id.
    ///
    /// Blank ids are treated as missing.
    #[must_use]
    pub fn from_verified(user_id: Option<impl Into<String>>) -> Self {
        match user_id.map(Into::into) {
            Some(id) if !id.trim().is_empty() => Identity::Identified(UserId(id)),
            _ => Identity::Anonymous,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Identity::Identified(id) => Some(id),
            Identity::Anonymous => None,
        }
    }

    #[must_use]
    pub fn is_identified(&self) -> bool {
        matches!(self, Identity::Identified(_))
    }
}
