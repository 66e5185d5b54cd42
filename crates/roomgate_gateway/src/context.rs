//! Per-connection context threaded through the hook pipeline.
//!
//! The context is the only channel between extensions. Each datum has a
//! named field, and each extension declares which fields it reads and
//! writes through [`ContextAccess`] so that the pipeline can check the
//! ordering contract when it is composed.

use roomgate_protocol::{ReadOnlyCode, UserIdentity};
use serde::Serialize;
use std::fmt;

/// The hook at which a connection was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticatedBy {
    /// Authenticated from the socket-open credentials (cookie or header).
    ConnectHook,
    /// Authenticated from an explicit credential message.
    AuthenticateHook,
}

/// Authentication state of a connection. Set at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    identity: Option<UserIdentity>,
    authenticated_by: Option<AuthenticatedBy>,
}

impl AuthContext {
    /// Creates an unauthenticated context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once an extension authenticated the connection.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_by.is_some()
    }

    /// Returns the authenticated identity.
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    /// Returns the hook that authenticated the connection.
    pub fn authenticated_by(&self) -> Option<AuthenticatedBy> {
        self.authenticated_by
    }

    /// Records a successful authentication.
    ///
    /// Returns false and leaves the context untouched if the connection is
    /// already authenticated.
    pub fn mark_authenticated(&mut self, identity: UserIdentity, by: AuthenticatedBy) -> bool {
        if self.is_authenticated() {
            return false;
        }
        self.identity = Some(identity);
        self.authenticated_by = Some(by);
        true
    }
}

/// Outcome of the read-only/capacity policy. Recomputed on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResult {
    /// The user may open the document.
    pub can_read: bool,
    /// The user may change the document.
    pub can_update: bool,
    /// The connection is forced read-only.
    pub read_only: bool,
    /// Why the connection is read-only.
    pub read_only_reason: Option<ReadOnlyCode>,
    /// The document accepts more than one concurrent editor.
    pub is_multi_user_allowed: bool,
    /// Maximum number of concurrent editors.
    pub max_collaborators: u32,
}

/// Everything the pipeline knows about a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionContext {
    /// Authentication state.
    pub auth: AuthContext,
    /// Latest authorization result, if authorization ran.
    pub authorization: Option<AuthorizationResult>,
}

impl ConnectionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the authenticated identity.
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.auth.identity()
    }

    /// Read-only code to report to the client.
    pub fn read_only_code(&self) -> Option<ReadOnlyCode> {
        if !self.auth.is_authenticated() {
            return Some(ReadOnlyCode::NotAuthenticated);
        }
        self.authorization
            .as_ref()
            .and_then(|result| result.read_only_reason)
    }
}

/// A named context field, for access declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextField {
    /// `auth.identity`
    Identity,
    /// `auth` as a whole (authentication state and hook).
    AuthContext,
    /// `authorization`
    Authorization,
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextField::Identity => f.write_str("identity"),
            ContextField::AuthContext => f.write_str("auth context"),
            ContextField::Authorization => f.write_str("authorization"),
        }
    }
}

/// Context fields an extension reads and writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextAccess {
    /// Fields the extension expects an earlier extension to have written.
    pub reads: &'static [ContextField],
    /// Fields the extension writes.
    pub writes: &'static [ContextField],
}

impl ContextAccess {
    /// No context access.
    pub const NONE: ContextAccess = ContextAccess {
        reads: &[],
        writes: &[],
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_context_is_set_once() {
        let mut auth = AuthContext::new();
        assert!(!auth.is_authenticated());

        assert!(auth.mark_authenticated(
            UserIdentity::new("u1", "a@example.com"),
            AuthenticatedBy::ConnectHook
        ));
        assert!(!auth.mark_authenticated(
            UserIdentity::new("u2", "b@example.com"),
            AuthenticatedBy::AuthenticateHook
        ));

        assert_eq!(auth.identity().map(|i| i.id.as_str()), Some("u1"));
        assert_eq!(auth.authenticated_by(), Some(AuthenticatedBy::ConnectHook));
    }

    #[test]
    fn read_only_code_of_unauthenticated_connection() {
        let context = ConnectionContext::new();
        assert_eq!(context.read_only_code(), Some(ReadOnlyCode::NotAuthenticated));
    }

    #[test]
    fn read_only_code_follows_authorization() {
        let mut context = ConnectionContext::new();
        context.auth.mark_authenticated(
            UserIdentity::new("u1", "a@example.com"),
            AuthenticatedBy::ConnectHook,
        );
        assert_eq!(context.read_only_code(), None);

        context.authorization = Some(AuthorizationResult {
            can_read: true,
            can_update: true,
            read_only: true,
            read_only_reason: Some(ReadOnlyCode::RoomCapacityReached),
            is_multi_user_allowed: true,
            max_collaborators: 1,
        });
        assert_eq!(
            context.read_only_code(),
            Some(ReadOnlyCode::RoomCapacityReached)
        );
    }
}
