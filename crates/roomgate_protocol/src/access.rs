//! Identity and document access types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an authenticated user, as resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Backend user ID.
    pub id: String,
    /// User email, used in diagnostics.
    pub email: String,
}

impl UserIdentity {
    /// Creates a new user identity.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Why a connection was forced read-only.
///
/// At most one code applies at a time; `None` means the connection can edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOnlyCode {
    /// The connection has not authenticated yet.
    NotAuthenticated,
    /// The user may read but not update the document.
    NoUpdateAccess,
    /// The document allows a single editor and one is already present.
    MultiUserNotAllowed,
    /// The room already holds the maximum number of collaborators.
    RoomCapacityReached,
}

impl ReadOnlyCode {
    /// Returns the wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadOnlyCode::NotAuthenticated => "not_authenticated",
            ReadOnlyCode::NoUpdateAccess => "no_update_access",
            ReadOnlyCode::MultiUserNotAllowed => "multi_user_not_allowed",
            ReadOnlyCode::RoomCapacityReached => "room_capacity_reached",
        }
    }
}

impl fmt::Display for ReadOnlyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permissions of a user on a document, as returned by the `INFO` pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPermissions {
    /// The user may open the document.
    pub can_read: bool,
    /// The user may change the document.
    pub can_update: bool,
    /// The document accepts more than one concurrent editor.
    pub is_multi_user: bool,
    /// Maximum number of concurrent editors.
    pub max_collaborators: u32,
}

impl DocumentPermissions {
    /// Permissions that deny everything. Used when the backend cannot be reached.
    pub fn deny_all() -> Self {
        Self {
            can_read: false,
            can_update: false,
            is_multi_user: false,
            max_collaborators: 0,
        }
    }
}
