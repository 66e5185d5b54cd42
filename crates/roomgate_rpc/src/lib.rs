//! # Roomgate RPC
//!
//! Reliable request/response client for the backend integration service.
//!
//! This crate provides:
//! - The broker transport abstraction and a scripted mock transport
//! - Per-attempt timeouts with exponential backoff (`2^n * base`)
//! - A typed integration client with conservative fallbacks
//!
//! ## Retry model
//!
//! A request is attempted at most `max_retries + 1` times. Timeouts and
//! backend error replies are retried; connection and codec failures are
//! not. When every attempt fails the error is wrapped in
//! [`RpcError::RetryExhausted`], unless retries were disabled, in which
//! case the error of the single attempt is returned as-is.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod sender;
mod transport;

pub use client::IntegrationClient;
pub use config::{BrokerConfig, RequestConfig};
pub use error::{RpcError, RpcResult};
pub use sender::{RpcSender, SenderStats};
pub use transport::{BrokerTransport, MockOutcome, MockTransport};
