//! # Roomgate Gateway
//!
//! Connection-lifecycle core of a collaborative editing gateway.
//!
//! This crate provides:
//! - An extension pipeline that dispatches lifecycle hooks in priority order
//! - Authentication of connections through the backend `WHO` pattern
//! - Read-only and capacity policy through the backend `INFO` pattern
//! - A registry of live connections per room
//! - Per-room contribution aggregation with periodic reporting
//! - Document persistence through the backend `FETCH`/`SAVE` patterns
//!
//! # Architecture
//!
//! The WebSocket transport and the CRDT engine live outside this crate.
//! They drive a [`Gateway`], which owns the pipeline and the shared
//! [`roomgate_rpc::IntegrationClient`]:
//!
//! ```rust,ignore
//! use roomgate_gateway::{Credentials, Gateway, GatewayConfig};
//!
//! let gateway = Gateway::new(GatewayConfig::from_file("gateway.json")?, transport)?;
//! let mut conn = gateway
//!     .open_connection("doc-1", Credentials::cookie(cookie_header), sink)
//!     .await?;
//! if !conn.is_connected() {
//!     gateway.authenticate(&mut conn, &token).await?;
//! }
//! ```
//!
//! Any hook error means the socket must be closed; the gateway has already
//! removed the connection from the registry by then.
//!
//! # Extension order
//!
//! | Extension       | Priority | Hooks                                          |
//! |-----------------|----------|------------------------------------------------|
//! | `authenticator` | 4        | `onConnect`, `onAuthenticate`                  |
//! | `authorizer`    | 3        | `onConnect`, `onAuthenticate`, `connected`     |
//! | `storage`       | 2        | `onLoadDocument`, `onStoreDocument`, `afterStoreDocument` |
//! | `contributions` | 1        | `onChange`, `onRoomOpen`, `onRoomClose`        |

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod authenticator;
mod authorizer;
mod config;
mod connection;
mod context;
mod contributions;
mod error;
mod extension;
mod gateway;
mod pipeline;
mod registry;
mod storage;

pub use authenticator::Authenticator;
pub use authorizer::{evaluate, Authorizer};
pub use config::{
    CollaborationSettings, GatewayConfig, LoggingSettings, RequestSettings, StorageKind,
};
pub use connection::{ConnectionHandle, ConnectionId, Credentials};
pub use context::{
    AuthContext, AuthenticatedBy, AuthorizationResult, ConnectionContext, ContextAccess,
    ContextField,
};
pub use contributions::{ContributionAggregator, ContributionReporter};
pub use error::{ConfigError, ConfigResult, HookError, HookResult, PipelineError};
pub use extension::{Extension, Hook, HookSet, LoadContext, StoreContext};
pub use gateway::Gateway;
pub use pipeline::{ConnectOutcome, Pipeline};
pub use registry::{ConnectionInfo, ConnectionRegistry, InMemoryRegistry};
pub use storage::{DocumentStorage, InMemoryStorage};
