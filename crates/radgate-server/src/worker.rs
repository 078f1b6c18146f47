//! Handler worker
//!
//! One short-lived task per accepted request. The worker asks admission
//! control for a token, selects the executing node, runs the handler
//! (in-process or remotely), transmits the reply, and then stays alive to
//! serve retransmissions until its retention timer fires. Every exit path
//! tells the listener what happened so the transaction table stays exact.

use crate::admission::AdmissionQueue;
use crate::counters::{NasCounters, ServerStats};
use crate::dispatch::{select_node, Dispatch, DiscardReason};
use crate::handler::HandlerDecision;
use crate::nas::NasRecord;
use crate::nodes::{NodeId, NodeMonitor, RemoteDecision, RemoteInvocation, RemoteRunner};
use crate::reqlog::{LogDirection, RequestLogEntry, RequestLogger};
use crate::request::RadiusRequest;
use crate::server::ServerSignal;
use crate::table::{RequestKey, WorkerId};
use radgate_proto::{encode_reply, Code};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Retransmissions served per retained reply
pub const RESEND_RETRIES: u32 = 3;

/// Hard deadline for a remote handler invocation
pub const REMOTE_REPLY_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) struct HandlerWorker {
    pub id: WorkerId,
    pub key: RequestKey,
    pub data: Vec<u8>,
    pub peer: SocketAddr,
    pub socket: Arc<UdpSocket>,
    pub record: NasRecord,
    pub stats: Arc<ServerStats>,
    pub admission: Arc<AdmissionQueue>,
    pub monitor: Arc<dyn NodeMonitor>,
    pub remote: Arc<dyn RemoteRunner>,
    pub request_log: Arc<RequestLogger>,
    pub resend_timeout: Duration,
    pub signals: mpsc::Sender<ServerSignal>,
    pub resend_rx: mpsc::Receiver<()>,
}

impl HandlerWorker {
    pub(crate) async fn run(mut self) {
        let nas_stats = self.stats.nas(self.record.props.nas_ip);

        let token = match self.admission.ask().await {
            Some(token) => token,
            None => {
                nas_stats.record_dropped();
                self.trace("request dropped by admission control");
                self.discard(DiscardReason::AdmissionRefused).await;
                return;
            }
        };

        let decision = {
            // ThreadRng must not be held across an await
            let mut rng = rand::rng();
            select_node(
                &self.monitor.nodes_for(&self.record.module),
                &self.record.props.handler_nodes,
                &self.monitor.local_node(),
                &mut rng,
            )
        };

        let outcome = match decision {
            Dispatch::Discard(reason) => Err(reason),
            Dispatch::Local => self.handle_local(&nas_stats).await,
            Dispatch::Remote(node) => self.handle_remote(node, &nas_stats).await,
        };

        // The admitted work is finished whether or not a reply exists;
        // retention does not hold an admission slot
        self.admission.done(token);

        match outcome {
            Ok(reply) => {
                if self
                    .signals
                    .send(ServerSignal::Replied { key: self.key })
                    .await
                    .is_err()
                {
                    // Listener is gone; nothing left to retain for
                    return;
                }
                self.retain(reply).await;
                self.discard_silent().await;
            }
            Err(reason) => {
                if reason.is_no_handler() {
                    self.stats.record_discard_no_handler();
                }
                self.discard(reason).await;
            }
        }
    }

    /// Decode, invoke the handler in-process, and transmit the reply
    async fn handle_local(&self, nas_stats: &NasCounters) -> Result<Vec<u8>, DiscardReason> {
        let request = match RadiusRequest::decode(&self.data, &self.record.props.secret) {
            Ok(request) => request,
            Err(e) => {
                nas_stats.record_malformed();
                debug!(
                    nas = %self.record.props.nas_ip,
                    request_id = self.key.request_id,
                    error = %e,
                    "failed to decode request"
                );
                return Err(DiscardReason::BadPdu);
            }
        };

        if !request.code.is_request() {
            nas_stats.record_malformed();
            debug!(
                nas = %self.record.props.nas_ip,
                code = request.code.as_u8(),
                "non-request command ignored"
            );
            return Err(DiscardReason::BadPdu);
        }

        nas_stats.record_request_command(request.code);
        self.log_packet(LogDirection::Request, request.code.as_u8(), self.data.len())
            .await;
        self.trace("invoking handler");

        // The callback runs in its own task so a panic unwinds there,
        // not through the worker
        let handler = Arc::clone(&self.record.handler);
        let props = self.record.props.clone();
        let callback_request = request.clone();
        let joined = tokio::spawn(async move {
            handler.radius_request(&callback_request, &props).await
        })
        .await;

        let decision = match joined {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                nas_stats.record_handler_failure();
                warn!(
                    nas = %self.record.props.nas_ip,
                    request_id = self.key.request_id,
                    error = %e,
                    "handler returned an error"
                );
                return Err(DiscardReason::HandlerFailure);
            }
            Err(join_error) => {
                nas_stats.record_handler_failure();
                warn!(
                    nas = %self.record.props.nas_ip,
                    request_id = self.key.request_id,
                    panicked = join_error.is_panic(),
                    "handler task failed: {}",
                    join_error
                );
                return Err(DiscardReason::HandlerFailure);
            }
        };

        let params = match decision {
            HandlerDecision::Reply(params) => params,
            HandlerDecision::NoReply => return Err(DiscardReason::HandlerReturnedNoReply),
        };

        let msg_hmac = request.msg_hmac || params.msg_hmac || !request.eap_message.is_empty();
        let reply = match encode_reply(
            request.identifier,
            &request.authenticator,
            params.code,
            &params.attributes,
            &self.record.props.secret,
            msg_hmac,
        ) {
            Ok(bytes) => bytes,
            Err(e) => {
                nas_stats.record_handler_failure();
                warn!(
                    nas = %self.record.props.nas_ip,
                    request_id = self.key.request_id,
                    error = %e,
                    "failed to encode reply"
                );
                return Err(DiscardReason::HandlerFailure);
            }
        };

        self.transmit(&reply).await?;
        nas_stats.record_reply_command(params.code);
        self.log_packet(LogDirection::Reply, params.code.as_u8(), reply.len())
            .await;
        self.trace("reply sent");
        Ok(reply)
    }

    /// Ship the raw request to a remote node and transmit whatever reply it
    /// encoded
    async fn handle_remote(
        &self,
        node: NodeId,
        nas_stats: &NasCounters,
    ) -> Result<Vec<u8>, DiscardReason> {
        // The remote node owns the decode; command accounting works off the
        // raw command byte here
        if let Some(code) = Code::from_u8(self.data[0]) {
            nas_stats.record_request_command(code);
        }
        self.log_packet(LogDirection::Request, self.data[0], self.data.len())
            .await;
        self.trace("dispatching to remote node");

        let invocation = RemoteInvocation {
            data: self.data.clone(),
            nas: self.record.props.clone(),
        };

        let result = tokio::time::timeout(
            REMOTE_REPLY_TIMEOUT,
            self.remote
                .invoke(&node, &self.record.module, invocation),
        )
        .await;

        let reply = match result {
            Err(_elapsed) => {
                nas_stats.record_handler_failure();
                warn!(
                    nas = %self.record.props.nas_ip,
                    request_id = self.key.request_id,
                    node = %node,
                    "remote handler reply timeout"
                );
                return Err(DiscardReason::RemoteTimeout(node));
            }
            Ok(Err(e)) => {
                nas_stats.record_handler_failure();
                warn!(
                    nas = %self.record.props.nas_ip,
                    request_id = self.key.request_id,
                    node = %node,
                    error = %e,
                    "remote handler failed"
                );
                return Err(DiscardReason::HandlerFailure);
            }
            Ok(Ok(RemoteDecision::NoReply)) => {
                return Err(DiscardReason::HandlerReturnedNoReply)
            }
            Ok(Ok(RemoteDecision::Reply(bytes))) => bytes,
        };

        if reply.is_empty() {
            nas_stats.record_handler_failure();
            warn!(node = %node, "remote node returned an empty reply");
            return Err(DiscardReason::HandlerFailure);
        }

        self.transmit(&reply).await?;
        if let Some(code) = Code::from_u8(reply[0]) {
            nas_stats.record_reply_command(code);
        }
        self.log_packet(LogDirection::Reply, reply[0], reply.len())
            .await;
        self.trace("remote reply sent");
        Ok(reply)
    }

    /// Serve retransmissions of the cached reply until the retention timer
    /// fires or the retry budget is spent
    async fn retain(&mut self, reply: Vec<u8>) {
        let deadline = tokio::time::sleep(self.resend_timeout);
        tokio::pin!(deadline);
        let mut resends = 0u32;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                received = self.resend_rx.recv() => match received {
                    Some(()) => {
                        if let Err(e) = self.socket.send_to(&reply, self.peer).await {
                            warn!(
                                nas = %self.record.props.nas_ip,
                                request_id = self.key.request_id,
                                error = %e,
                                "failed to retransmit reply"
                            );
                            break;
                        }
                        resends += 1;
                        debug!(
                            nas = %self.record.props.nas_ip,
                            request_id = self.key.request_id,
                            resends,
                            "retransmitted cached reply"
                        );
                        if resends >= RESEND_RETRIES {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }

    async fn transmit(&self, reply: &[u8]) -> Result<(), DiscardReason> {
        if let Err(e) = self.socket.send_to(reply, self.peer).await {
            warn!(
                nas = %self.record.props.nas_ip,
                request_id = self.key.request_id,
                error = %e,
                "failed to send reply"
            );
            return Err(DiscardReason::HandlerFailure);
        }
        Ok(())
    }

    async fn discard(&self, reason: DiscardReason) {
        debug!(
            nas = %self.record.props.nas_ip,
            request_id = self.key.request_id,
            reason = reason.label(),
            "request discarded"
        );
        self.discard_silent().await;
    }

    async fn discard_silent(&self) {
        let _ = self
            .signals
            .send(ServerSignal::Discarded { key: self.key })
            .await;
    }

    async fn log_packet(&self, direction: LogDirection, command: u8, length: usize) {
        self.request_log
            .write_request(RequestLogEntry::new(
                direction,
                (
                    self.record.props.nas_ip,
                    self.record.props.nas_port,
                    self.key.request_id,
                ),
                command,
                length,
            ))
            .await;
    }

    fn trace(&self, what: &str) {
        if self.record.props.trace {
            info!(
                nas = %self.record.props.nas_ip,
                nas_port = self.record.props.nas_port,
                request_id = self.key.request_id,
                worker = self.id.0,
                "{}",
                what
            );
        }
    }
}
