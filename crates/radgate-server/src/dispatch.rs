//! Node selection for handler execution
//!
//! Given the set of nodes currently advertising a handler module and the
//! NAS's node preference, decide where the request runs. Selection among
//! multiple eligible nodes is uniformly random per request so sustained
//! load from one NAS spreads across the pool.

use crate::nas::HandlerNodes;
use crate::nodes::NodeId;
use rand::Rng;
use std::collections::HashSet;

/// Why a request was discarded without invoking a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Fewer than two bytes, or the bytes failed to decode
    BadPdu,
    /// Source IP not present in the NAS registry
    UnknownNas,
    /// No node advertises the handler module
    NoNodes,
    /// The NAS pins execution locally but the local node does not advertise
    /// the module
    NoNodesLocal,
    /// The handler explicitly declined to answer
    HandlerReturnedNoReply,
    /// The handler callback failed or panicked
    HandlerFailure,
    /// The remote node did not reply within the RPC deadline
    RemoteTimeout(NodeId),
    /// Admission control refused the request
    AdmissionRefused,
}

impl DiscardReason {
    /// Reasons counted against the server-level `discard_no_handler`
    pub fn is_no_handler(&self) -> bool {
        matches!(self, DiscardReason::NoNodes | DiscardReason::NoNodesLocal)
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            DiscardReason::BadPdu => "bad_pdu",
            DiscardReason::UnknownNas => "unknown_nas",
            DiscardReason::NoNodes => "no_nodes",
            DiscardReason::NoNodesLocal => "no_nodes_local",
            DiscardReason::HandlerReturnedNoReply => "handler_returned_noreply",
            DiscardReason::HandlerFailure => "handler_failure",
            DiscardReason::RemoteTimeout(_) => "remote_handler_reply_timeout",
            DiscardReason::AdmissionRefused => "packets_dropped",
        }
    }
}

/// Where the request will execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Run the handler in-process
    Local,
    /// Ship the request to a remote node
    Remote(NodeId),
    /// Do not run the handler at all
    Discard(DiscardReason),
}

/// Select the node that will execute a request.
///
/// `advertised` comes from the node monitor, `preference` from the NAS
/// registration, `local` is this listener's node identity.
pub fn select_node(
    advertised: &HashSet<NodeId>,
    preference: &HandlerNodes,
    local: &NodeId,
    rng: &mut impl Rng,
) -> Dispatch {
    if advertised.is_empty() {
        return Dispatch::Discard(DiscardReason::NoNodes);
    }

    let permitted: Vec<&NodeId> = match preference {
        HandlerNodes::Local => {
            return if advertised.contains(local) {
                Dispatch::Local
            } else {
                Dispatch::Discard(DiscardReason::NoNodesLocal)
            };
        }
        HandlerNodes::Nodes(preferred) => {
            let mut candidates: Vec<&NodeId> =
                advertised.intersection(preferred).collect();
            // Sorted so the random index sees a stable ordering of the set
            candidates.sort();
            candidates
        }
    };

    match permitted.len() {
        0 => Dispatch::Discard(DiscardReason::NoNodes),
        1 => to_dispatch(permitted[0], local),
        n => {
            let chosen = permitted[rng.random_range(0..n)];
            to_dispatch(chosen, local)
        }
    }
}

fn to_dispatch(chosen: &NodeId, local: &NodeId) -> Dispatch {
    if chosen == local {
        Dispatch::Local
    } else {
        Dispatch::Remote(chosen.clone())
    }
}
