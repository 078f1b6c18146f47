//! Server and per-NAS statistics counters
//!
//! Counters are keyed `(server endpoint, NAS, metric)`. Updates are plain
//! relaxed atomic increments; `pull` snapshots and zeroes each counter in a
//! single atomic swap so no increment is ever lost between the read and the
//! reset.

use dashmap::DashMap;
use radgate_proto::Code;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How a statistics call treats the stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    /// Return the current values and zero them in one step
    Pull,
    /// Return the current values without mutation
    Read,
    /// Zero the values; the returned snapshot reflects the zeroed state
    Reset,
}

#[derive(Default)]
struct Counter(AtomicU64);

impl Counter {
    fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn take(&self, kind: StatsKind) -> u64 {
        match kind {
            StatsKind::Read => self.0.load(Ordering::Relaxed),
            StatsKind::Pull => self.0.swap(0, Ordering::Relaxed),
            StatsKind::Reset => {
                self.0.store(0, Ordering::Relaxed);
                0
            }
        }
    }
}

/// Counters maintained per registered NAS
#[derive(Default)]
pub struct NasCounters {
    requests: Counter,
    dup_requests: Counter,
    malformed_requests: Counter,
    packets_dropped: Counter,
    handler_failure: Counter,

    access_requests: Counter,
    account_requests: Counter,
    coa_requests: Counter,
    disconnect_requests: Counter,

    access_accepts: Counter,
    access_rejects: Counter,
    access_challenges: Counter,
    account_responses: Counter,
    coa_acks: Counter,
    coa_naks: Counter,
    disc_acks: Counter,
    disc_naks: Counter,
}

impl NasCounters {
    /// A request was accepted into the table for this NAS
    pub fn record_request(&self) {
        self.requests.inc();
    }

    /// A duplicate arrived while a transaction was live
    pub fn record_duplicate(&self) {
        self.dup_requests.inc();
    }

    /// Request bytes failed to decode
    pub fn record_malformed(&self) {
        self.malformed_requests.inc();
    }

    /// Admission control refused the request
    pub fn record_dropped(&self) {
        self.packets_dropped.inc();
    }

    /// The handler callback failed, panicked, or was unreachable
    pub fn record_handler_failure(&self) {
        self.handler_failure.inc();
    }

    /// Count an ingested request by command
    pub fn record_request_command(&self, code: Code) {
        match code {
            Code::AccessRequest => self.access_requests.inc(),
            Code::AccountingRequest => self.account_requests.inc(),
            Code::CoaRequest => self.coa_requests.inc(),
            Code::DisconnectRequest => self.disconnect_requests.inc(),
            _ => {}
        }
    }

    /// Count a transmitted reply by command
    pub fn record_reply_command(&self, code: Code) {
        match code {
            Code::AccessAccept => self.access_accepts.inc(),
            Code::AccessReject => self.access_rejects.inc(),
            Code::AccessChallenge => self.access_challenges.inc(),
            Code::AccountingResponse => self.account_responses.inc(),
            Code::CoaAck => self.coa_acks.inc(),
            Code::CoaNak => self.coa_naks.inc(),
            Code::DisconnectAck => self.disc_acks.inc(),
            Code::DisconnectNak => self.disc_naks.inc(),
            _ => {}
        }
    }

    fn snapshot(&self, nas_ip: IpAddr, kind: StatsKind) -> NasStatsSnapshot {
        NasStatsSnapshot {
            nas_ip: nas_ip.to_string(),
            requests: self.requests.take(kind),
            dup_requests: self.dup_requests.take(kind),
            malformed_requests: self.malformed_requests.take(kind),
            packets_dropped: self.packets_dropped.take(kind),
            handler_failure: self.handler_failure.take(kind),
            access_requests: self.access_requests.take(kind),
            account_requests: self.account_requests.take(kind),
            coa_requests: self.coa_requests.take(kind),
            disconnect_requests: self.disconnect_requests.take(kind),
            access_accepts: self.access_accepts.take(kind),
            access_rejects: self.access_rejects.take(kind),
            access_challenges: self.access_challenges.take(kind),
            account_responses: self.account_responses.take(kind),
            coa_acks: self.coa_acks.take(kind),
            coa_naks: self.coa_naks.take(kind),
            disc_acks: self.disc_acks.take(kind),
            disc_naks: self.disc_naks.take(kind),
        }
    }
}

/// Statistics store for one server instance
pub struct ServerStats {
    server: SocketAddr,
    invalid_requests: Counter,
    discard_no_handler: Counter,
    nas: DashMap<IpAddr, Arc<NasCounters>>,
}

impl ServerStats {
    pub fn new(server: SocketAddr) -> Self {
        ServerStats {
            server,
            invalid_requests: Counter::default(),
            discard_no_handler: Counter::default(),
            nas: DashMap::new(),
        }
    }

    /// Endpoint these counters are tagged with
    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    /// A packet was discarded before NAS attribution (bad PDU, unknown NAS)
    pub fn record_invalid_request(&self) {
        self.invalid_requests.inc();
    }

    /// No node was available to run the handler
    pub fn record_discard_no_handler(&self) {
        self.discard_no_handler.inc();
    }

    /// Counter set for a NAS, created on first touch
    pub fn nas(&self, nas_ip: IpAddr) -> Arc<NasCounters> {
        self.nas
            .entry(nas_ip)
            .or_insert_with(|| Arc::new(NasCounters::default()))
            .clone()
    }

    /// Produce a snapshot according to `kind`
    pub fn snapshot(&self, kind: StatsKind) -> StatsSnapshot {
        let mut nas: Vec<NasStatsSnapshot> = self
            .nas
            .iter()
            .map(|entry| entry.value().snapshot(*entry.key(), kind))
            .collect();
        nas.sort_by(|a, b| a.nas_ip.cmp(&b.nas_ip));

        StatsSnapshot {
            server: self.server.to_string(),
            invalid_requests: self.invalid_requests.take(kind),
            discard_no_handler: self.discard_no_handler.take(kind),
            nas,
        }
    }
}

/// Point-in-time view of one NAS's counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasStatsSnapshot {
    pub nas_ip: String,
    pub requests: u64,
    pub dup_requests: u64,
    pub malformed_requests: u64,
    pub packets_dropped: u64,
    pub handler_failure: u64,
    pub access_requests: u64,
    pub account_requests: u64,
    pub coa_requests: u64,
    pub disconnect_requests: u64,
    pub access_accepts: u64,
    pub access_rejects: u64,
    pub access_challenges: u64,
    pub account_responses: u64,
    pub coa_acks: u64,
    pub coa_naks: u64,
    pub disc_acks: u64,
    pub disc_naks: u64,
}

/// Point-in-time view of a server's counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub server: String,
    pub invalid_requests: u64,
    pub discard_no_handler: u64,
    pub nas: Vec<NasStatsSnapshot>,
}

impl StatsSnapshot {
    /// Export as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Find the snapshot for a NAS by IP
    pub fn nas(&self, nas_ip: IpAddr) -> Option<&NasStatsSnapshot> {
        let key = nas_ip.to_string();
        self.nas.iter().find(|n| n.nas_ip == key)
    }
}
