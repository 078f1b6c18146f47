//! Distributed RADIUS Server Core
//!
//! This crate provides the server framework on top of the `radgate-proto`
//! wire implementation: a UDP listener with RFC-style duplicate suppression
//! and reply retention, per-request handler workers with failure isolation,
//! node dispatch for distributed handler execution, admission control and
//! per-NAS statistics.
//!
//! # Example
//!
//! ```rust,no_run
//! use radgate_server::{
//!     NasRegistration, RadiusServer, ServerConfig, SimpleAuthHandler, StaticNasRegistry,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut handler = SimpleAuthHandler::new();
//!     handler.add_user("alice", "password");
//!
//!     let mut registry = StaticNasRegistry::new();
//!     registry.register(NasRegistration::new(
//!         "192.168.1.0/24".parse()?,
//!         "secret",
//!         "default",
//!         Arc::new(handler),
//!     ));
//!
//!     let config = ServerConfig::new("0.0.0.0:1812".parse()?, Arc::new(registry));
//!     let server = RadiusServer::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod config;
pub mod counters;
pub mod dispatch;
pub mod handler;
pub mod nas;
pub mod nodes;
pub mod reqlog;
pub mod request;
pub mod server;
pub mod table;
mod worker;

pub use admission::{AdmissionConfig, AdmissionQueue, AdmissionToken};
pub use config::{Config, ConfigError, NasEntry, User};
pub use counters::{NasStatsSnapshot, ServerStats, StatsKind, StatsSnapshot};
pub use dispatch::{select_node, DiscardReason, Dispatch};
pub use handler::{HandlerDecision, HandlerError, RadiusHandler, ReplyParams, SimpleAuthHandler};
pub use nas::{HandlerNodes, NasProperties, NasRecord, NasRegistration, NasRegistry, StaticNasRegistry};
pub use nodes::{
    NodeId, NodeMonitor, RemoteDecision, RemoteError, RemoteInvocation, RemoteRunner,
    StaticNodeMonitor, UnreachableRemote,
};
pub use reqlog::{LogDirection, RequestLogEntry, RequestLogger};
pub use request::RadiusRequest;
pub use server::{RadiusServer, ServerConfig, ServerError};
pub use table::{RequestKey, TransactionState, TransactionTable, WorkerId};
pub use worker::{REMOTE_REPLY_TIMEOUT, RESEND_RETRIES};
