//! # Roomgate Testkit
//!
//! Test utilities for the roomgate gateway.
//!
//! This crate provides:
//! - `FakeBackend`, an in-memory backend behind the broker transport trait
//! - `RecordingSink`, a stateless sink that records what clients receive
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use roomgate_testkit::prelude::*;
//!
//! let backend = FakeBackend::new();
//! backend.add_user("Bearer t1", UserIdentity::new("u1", "u1@example.com"));
//! backend.set_permissions("u1", "doc", DocumentPermissions::deny_all());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod generators;
pub mod sink;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::*;
    pub use crate::generators::*;
    pub use crate::sink::*;
    pub use roomgate_protocol::{DocumentPermissions, StatelessMessage, UserIdentity};
}

pub use backend::*;
pub use generators::*;
pub use sink::*;
