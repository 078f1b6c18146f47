//! Listener
//!
//! The singleton owner of one UDP endpoint. All socket reads, all
//! transaction-table mutations and all internal signals flow through a
//! single task, so duplicate detection is one table lookup and no lock ever
//! guards the table. Handler work happens in spawned worker tasks; their
//! exits are observed here and the table is cleaned transitively after an
//! abnormal one.

use crate::admission::{AdmissionConfig, AdmissionQueue};
use crate::counters::{ServerStats, StatsKind, StatsSnapshot};
use crate::dispatch::DiscardReason;
use crate::nas::NasRegistry;
use crate::nodes::{NodeId, NodeMonitor, RemoteRunner, StaticNodeMonitor, UnreachableRemote};
use crate::reqlog::RequestLogger;
use crate::table::{RequestKey, TransactionState, TransactionTable, WorkerId};
use crate::worker::{HandlerWorker, RESEND_RETRIES};
use radgate_proto::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runtime assembly for one server instance
pub struct ServerConfig {
    /// Bind address for the server
    pub bind_addr: SocketAddr,
    /// NAS registry consulted per datagram
    pub registry: Arc<dyn NasRegistry>,
    /// Node-membership monitor
    pub monitor: Arc<dyn NodeMonitor>,
    /// Remote execution transport
    pub remote: Arc<dyn RemoteRunner>,
    /// Admission queue configuration
    pub admission: AdmissionConfig,
    /// Reply retention duration
    pub resend_timeout: Duration,
    /// Request logger
    pub request_log: Arc<RequestLogger>,
}

impl ServerConfig {
    /// Defaults: single local node, no remote transport, default admission
    /// limits, 5 second reply retention, request logging disabled
    pub fn new(bind_addr: SocketAddr, registry: Arc<dyn NasRegistry>) -> Self {
        ServerConfig {
            bind_addr,
            registry,
            monitor: Arc::new(StaticNodeMonitor::new(NodeId::from("local"))),
            remote: Arc::new(UnreachableRemote),
            admission: AdmissionConfig::default(),
            resend_timeout: Duration::from_millis(5000),
            request_log: Arc::new(RequestLogger::disabled()),
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn NodeMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteRunner>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_resend_timeout(mut self, resend_timeout: Duration) -> Self {
        self.resend_timeout = resend_timeout;
        self
    }

    pub fn with_request_log(mut self, request_log: Arc<RequestLogger>) -> Self {
        self.request_log = request_log;
        self
    }
}

/// Internal signals from workers to the listener
#[derive(Debug)]
pub(crate) enum ServerSignal {
    /// The worker transmitted its reply and entered retention
    Replied { key: RequestKey },
    /// The worker is done with the transaction
    Discarded { key: RequestKey },
    /// The worker task finished; `clean` is false after a panic
    WorkerExited { worker: WorkerId, clean: bool },
}

/// One RADIUS server instance bound to a UDP endpoint
pub struct RadiusServer {
    config: ServerConfig,
    socket: Arc<UdpSocket>,
    stats: Arc<ServerStats>,
    admission: Arc<AdmissionQueue>,
    shutdown_tx: watch::Sender<bool>,
}

impl RadiusServer {
    /// Bind the endpoint and initialize counters and the admission queue
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let local_addr = socket.local_addr()?;
        info!("RADIUS server listening on {}", local_addr);

        let stats = Arc::new(ServerStats::new(local_addr));
        let admission = Arc::new(AdmissionQueue::new(
            format!("radius:{}", local_addr),
            config.admission.clone(),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(RadiusServer {
            config,
            socket: Arc::new(socket),
            stats,
            admission,
            shutdown_tx,
        })
    }

    /// Local address the server is bound to (useful with port 0 in tests)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.socket.local_addr().map_err(ServerError::from)
    }

    /// Snapshot the counters; see [`StatsKind`] for pull/read/reset semantics
    pub fn stats(&self, kind: StatsKind) -> StatsSnapshot {
        self.stats.snapshot(kind)
    }

    /// Ask the listener to stop after its current select round
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Receive datagrams and internal signals until shutdown
    pub async fn run(&self) -> Result<(), ServerError> {
        let local_addr = self.socket.local_addr()?;
        let mut table = TransactionTable::new();
        let (signal_tx, mut signal_rx) = mpsc::channel::<ServerSignal>(1024);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = vec![0u8; Packet::MAX_LEN];
        let mut next_worker: u64 = 0;

        // A shutdown requested before this subscription would otherwise
        // never wake `changed()`
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = received?;
                    self.ingest(
                        &buf[..len],
                        peer,
                        local_addr,
                        &mut table,
                        &signal_tx,
                        &mut next_worker,
                    );
                }
                Some(signal) = signal_rx.recv() => {
                    Self::apply_signal(signal, &mut table);
                }
                _ = shutdown_rx.changed() => {
                    info!(
                        server = %local_addr,
                        in_flight = table.len(),
                        "server shutting down"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Process one received datagram
    fn ingest(
        &self,
        data: &[u8],
        peer: SocketAddr,
        local_addr: SocketAddr,
        table: &mut TransactionTable,
        signals: &mpsc::Sender<ServerSignal>,
        next_worker: &mut u64,
    ) {
        // Two bytes minimum: command and identifier
        if data.len() < 2 {
            self.stats.record_invalid_request();
            debug!(
                client = %peer,
                len = data.len(),
                reason = DiscardReason::BadPdu.label(),
                "discarding runt datagram"
            );
            return;
        }

        let mut record = match self.config.registry.lookup(local_addr, peer.ip()) {
            Some(record) => record,
            None => {
                self.stats.record_invalid_request();
                debug!(
                    client = %peer,
                    reason = DiscardReason::UnknownNas.label(),
                    "discarding datagram from unknown NAS"
                );
                return;
            }
        };
        record.props.nas_port = peer.port();

        let key = RequestKey::new(peer.ip(), peer.port(), data[1]);

        match table.get(&key).map(|t| t.state) {
            None => {
                let worker_id = WorkerId(*next_worker);
                *next_worker += 1;

                self.stats.nas(peer.ip()).record_request();
                if record.props.trace {
                    info!(
                        nas = %peer,
                        request_id = key.request_id,
                        worker = worker_id.0,
                        "accepted request"
                    );
                }

                let (resend_tx, resend_rx) = mpsc::channel(RESEND_RETRIES as usize);
                let worker = HandlerWorker {
                    id: worker_id,
                    key,
                    data: data.to_vec(),
                    peer,
                    socket: Arc::clone(&self.socket),
                    record,
                    stats: Arc::clone(&self.stats),
                    admission: Arc::clone(&self.admission),
                    monitor: Arc::clone(&self.config.monitor),
                    remote: Arc::clone(&self.config.remote),
                    request_log: Arc::clone(&self.config.request_log),
                    resend_timeout: self.config.resend_timeout,
                    signals: signals.clone(),
                    resend_rx,
                };

                let handle = tokio::spawn(worker.run());

                // Exit watcher: a panicking worker cannot signal its own
                // death, so its join result is relayed here
                let exit_tx = signals.clone();
                tokio::spawn(async move {
                    let clean = handle.await.is_ok();
                    let _ = exit_tx
                        .send(ServerSignal::WorkerExited {
                            worker: worker_id,
                            clean,
                        })
                        .await;
                });

                table.insert_handling(key, worker_id, resend_tx);
            }
            Some(TransactionState::Handling) => {
                self.stats.nas(peer.ip()).record_duplicate();
                debug!(
                    client = %peer,
                    request_id = key.request_id,
                    "duplicate while handling, discarded"
                );
            }
            Some(TransactionState::Replied) => {
                self.stats.nas(peer.ip()).record_duplicate();
                if let Some(entry) = table.get(&key) {
                    // A full queue means the retry budget is already spent
                    let _ = entry.resend_tx.try_send(());
                }
                debug!(
                    client = %peer,
                    request_id = key.request_id,
                    "duplicate after reply, retransmission requested"
                );
            }
        }
    }

    fn apply_signal(signal: ServerSignal, table: &mut TransactionTable) {
        match signal {
            ServerSignal::Replied { key } => table.mark_replied(&key),
            ServerSignal::Discarded { key } => {
                table.remove(&key);
            }
            ServerSignal::WorkerExited { worker, clean } => {
                if !clean {
                    let purged = table.purge_worker(worker);
                    if purged > 0 {
                        warn!(
                            worker = worker.0,
                            purged,
                            "purged transactions after abnormal worker exit"
                        );
                    }
                }
            }
        }
    }
}
