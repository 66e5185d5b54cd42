//! Property-based test generators using proptest.

use proptest::prelude::*;
use roomgate_protocol::{DocumentPermissions, UserIdentity};

/// Strategy for generating document (room) IDs.
pub fn document_id_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{24}"
}

/// Strategy for generating user identities.
pub fn identity_strategy() -> impl Strategy<Value = UserIdentity> {
    ("[a-z0-9]{1,12}", "[a-z]{1,8}").prop_map(|(id, name)| {
        let email = format!("{name}@example.com");
        UserIdentity::new(id, email)
    })
}

/// Strategy for generating arbitrary permissions.
pub fn permissions_strategy() -> impl Strategy<Value = DocumentPermissions> {
    (any::<bool>(), any::<bool>(), any::<bool>(), 0u32..8).prop_map(
        |(can_read, can_update, is_multi_user, max_collaborators)| DocumentPermissions {
            can_read,
            can_update,
            is_multi_user,
            max_collaborators,
        },
    )
}

/// Strategy for generating raw document state.
pub fn document_state_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}
