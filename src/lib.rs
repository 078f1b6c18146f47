//! Distributed RADIUS server framework
//!
//! Umbrella crate re-exporting the wire protocol (`radgate-proto`) and the
//! server core (`radgate-server`). The workspace-level integration tests and
//! benchmarks build against this crate.

pub use radgate_proto as proto;
pub use radgate_server as server;
