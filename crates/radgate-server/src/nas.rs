//! NAS registry
//!
//! Maps an incoming source address to the handler responsible for it plus
//! the per-NAS properties (shared secret, node preference, trace flag).
//! The registry is consulted once per datagram by the listener; unknown
//! sources are discarded before any handler work happens.

use crate::handler::RadiusHandler;
use crate::nodes::NodeId;
use ipnetwork::IpNetwork;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Where a NAS's handler is allowed to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerNodes {
    /// Pin execution to the listener's own node
    Local,
    /// Explicit set of permitted worker identities
    Nodes(HashSet<NodeId>),
}

impl Default for HandlerNodes {
    fn default() -> Self {
        HandlerNodes::Local
    }
}

/// Per-NAS properties carried by a handler worker for the life of a request
#[derive(Debug, Clone)]
pub struct NasProperties {
    /// Listener endpoint this NAS talks to
    pub server_addr: SocketAddr,
    /// NAS source IP
    pub nas_ip: IpAddr,
    /// NAS source port of the request being handled
    pub nas_port: u16,
    /// Shared secret for this NAS
    pub secret: Vec<u8>,
    /// Emit per-packet trace lines for this NAS
    pub trace: bool,
    /// Node preference for handler execution
    pub handler_nodes: HandlerNodes,
    /// Optional display name from configuration
    pub name: Option<String>,
}

impl NasProperties {
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        NasProperties {
            server_addr: "127.0.0.1:1812".parse().unwrap(),
            nas_ip: "192.168.1.1".parse().unwrap(),
            nas_port: 0,
            secret: b"testing123".to_vec(),
            trace: false,
            handler_nodes: HandlerNodes::Local,
            name: None,
        }
    }
}

/// Registry lookup result: the handler, its module name, and the properties
#[derive(Clone)]
pub struct NasRecord {
    pub handler: Arc<dyn RadiusHandler>,
    pub module: String,
    pub props: NasProperties,
}

/// Resolves a source address to a registered NAS
pub trait NasRegistry: Send + Sync {
    /// Look up the NAS behind `nas_ip` for the given listener endpoint.
    /// Returns `None` for unknown sources.
    fn lookup(&self, server: SocketAddr, nas_ip: IpAddr) -> Option<NasRecord>;
}

/// One NAS registration: address range, secret, handler binding and options
pub struct NasRegistration {
    network: IpNetwork,
    secret: Vec<u8>,
    module: String,
    handler: Arc<dyn RadiusHandler>,
    name: Option<String>,
    handler_nodes: HandlerNodes,
    trace: bool,
}

impl NasRegistration {
    pub fn new(
        network: IpNetwork,
        secret: impl Into<Vec<u8>>,
        module: impl Into<String>,
        handler: Arc<dyn RadiusHandler>,
    ) -> Self {
        NasRegistration {
            network,
            secret: secret.into(),
            module: module.into(),
            handler,
            name: None,
            handler_nodes: HandlerNodes::Local,
            trace: false,
        }
    }

    /// Set a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Permit handler execution on an explicit node set
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.handler_nodes = HandlerNodes::Nodes(nodes.into_iter().collect());
        self
    }

    /// Enable per-packet trace lines
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// In-memory NAS registry
///
/// Entries match on source IP, with CIDR ranges supported. First match wins,
/// so narrower networks should be registered before wider ones.
#[derive(Default)]
pub struct StaticNasRegistry {
    entries: Vec<NasRegistration>,
}

impl StaticNasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: NasRegistration) {
        self.entries.push(registration);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NasRegistry for StaticNasRegistry {
    fn lookup(&self, server: SocketAddr, nas_ip: IpAddr) -> Option<NasRecord> {
        let entry = self.entries.iter().find(|e| e.network.contains(nas_ip))?;
        Some(NasRecord {
            handler: Arc::clone(&entry.handler),
            module: entry.module.clone(),
            props: NasProperties {
                server_addr: server,
                nas_ip,
                // Filled in by the listener from the datagram's source port
                nas_port: 0,
                secret: entry.secret.clone(),
                trace: entry.trace,
                handler_nodes: entry.handler_nodes.clone(),
                name: entry.name.clone(),
            },
        })
    }
}
