//! Worker node identity, membership and remote execution seams
//!
//! Handler modules may be advertised by a set of worker nodes. The
//! [`NodeMonitor`] reports current membership; the [`RemoteRunner`] executes
//! a request on a selected remote node and hands back the encoded reply.
//! Production deployments plug their own implementations in; the bundled
//! [`StaticNodeMonitor`] and [`UnreachableRemote`] cover single-node setups
//! and tests.

use crate::nas::NasProperties;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Identity of a worker node in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        NodeId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        NodeId(name.to_string())
    }
}

/// Reports which nodes currently advertise a handler module
pub trait NodeMonitor: Send + Sync {
    /// Identity of the node this listener runs on
    fn local_node(&self) -> NodeId;

    /// Nodes currently advertising `module`
    fn nodes_for(&self, module: &str) -> HashSet<NodeId>;
}

/// Fixed membership monitor
///
/// Modules not explicitly advertised are served by the local node, which
/// keeps single-node deployments working with an empty advertisement map.
pub struct StaticNodeMonitor {
    local: NodeId,
    advertised: DashMap<String, HashSet<NodeId>>,
}

impl StaticNodeMonitor {
    pub fn new(local: NodeId) -> Self {
        StaticNodeMonitor {
            local,
            advertised: DashMap::new(),
        }
    }

    /// Replace the advertisement set for a module
    pub fn advertise(&self, module: impl Into<String>, nodes: impl IntoIterator<Item = NodeId>) {
        self.advertised
            .insert(module.into(), nodes.into_iter().collect());
    }

    /// Drop a module from the advertisement map entirely
    pub fn withdraw(&self, module: &str) {
        self.advertised.insert(module.to_string(), HashSet::new());
    }
}

impl NodeMonitor for StaticNodeMonitor {
    fn local_node(&self) -> NodeId {
        self.local.clone()
    }

    fn nodes_for(&self, module: &str) -> HashSet<NodeId> {
        match self.advertised.get(module) {
            Some(nodes) => nodes.clone(),
            None => HashSet::from([self.local.clone()]),
        }
    }
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),
    #[error("remote handler failed: {0}")]
    Failed(String),
}

/// Raw request material shipped to a remote node
///
/// The remote side performs its own decode, callback dispatch and reply
/// encoding; shipping bytes rather than a decoded request keeps the
/// retransmitted reply byte-identical no matter which node produced it.
#[derive(Debug, Clone)]
pub struct RemoteInvocation {
    pub data: Vec<u8>,
    pub nas: NasProperties,
}

/// Outcome of a remote handler invocation
#[derive(Debug, Clone)]
pub enum RemoteDecision {
    /// Encoded reply bytes, ready to send on the local socket
    Reply(Vec<u8>),
    /// The remote handler chose not to answer
    NoReply,
}

/// Executes a handler invocation on a remote node
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    async fn invoke(
        &self,
        node: &NodeId,
        module: &str,
        invocation: RemoteInvocation,
    ) -> Result<RemoteDecision, RemoteError>;
}

/// Default runner for deployments without a remote transport
pub struct UnreachableRemote;

#[async_trait]
impl RemoteRunner for UnreachableRemote {
    async fn invoke(
        &self,
        node: &NodeId,
        _module: &str,
        _invocation: RemoteInvocation,
    ) -> Result<RemoteDecision, RemoteError> {
        Err(RemoteError::Unreachable(node.clone()))
    }
}
