//! # Roomgate Protocol
//!
//! Wire types shared by the roomgate collaboration gateway.
//!
//! This crate provides:
//! - Identity and access types (`UserIdentity`, `DocumentPermissions`, `ReadOnlyCode`)
//! - RPC message patterns and their request/response payloads
//! - Stateless out-of-band client messages (`read-only-state`, `saved`, `save-error`)
//! - Base64 codec for document content
//!
//! This is a pure protocol crate with no I/O operations. Everything is
//! JSON-encoded through `serde`, which is what both the message broker and
//! the WebSocket clients speak.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod content;
mod error;
mod messages;
mod stateless;

pub use access::{DocumentPermissions, ReadOnlyCode, UserIdentity};
pub use content::{decode_content, encode_content};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ContributionsEvent, EventPattern, FetchErrorCode, FetchRequest, FetchResponse,
    HealthCheckResponse, InfoRequest, MessagePattern, RpcEvent, RpcRequest, SaveRequest,
    SaveResponse, WhoRequest, HEALTH_CHECK_PAYLOAD,
};
pub use stateless::{StatelessMessage, StatelessSink};
