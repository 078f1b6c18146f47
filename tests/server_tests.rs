//! End-to-end tests for the RADIUS server core
//!
//! Each test drives a real server bound to 127.0.0.1:0 with raw datagrams
//! and checks the observable contract: replies on the wire, counter
//! movements, duplicate suppression, retention, dispatch discards and
//! crash isolation.

use async_trait::async_trait;
use radgate_proto::{
    calculate_request_authenticator, generate_request_authenticator, Attribute, AttributeType,
    Code, Packet,
};
use radgate_server::{
    AdmissionConfig, HandlerDecision, HandlerError, NasProperties, NasRegistration, NodeId,
    RadiusHandler, RadiusRequest, RadiusServer, RemoteDecision, RemoteError, RemoteInvocation,
    RemoteRunner, ReplyParams, ServerConfig, StaticNasRegistry, StaticNodeMonitor, StatsKind,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::timeout;

/// How a test handler answers
enum Behavior {
    /// Accept every access request
    Accept,
    /// Decline to answer
    NoReply,
    /// Return an error from the callback
    Fail,
    /// Panic inside the callback
    Panic,
    /// Wait for the latch, then accept
    Block(Arc<Notify>),
}

struct TestHandler {
    behavior: Behavior,
    invocations: AtomicU32,
}

impl TestHandler {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(TestHandler {
            behavior,
            invocations: AtomicU32::new(0),
        })
    }

    fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RadiusHandler for TestHandler {
    async fn radius_request(
        &self,
        request: &RadiusRequest,
        _nas: &NasProperties,
    ) -> Result<HandlerDecision, HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Accept => {}
            Behavior::NoReply => return Ok(HandlerDecision::NoReply),
            Behavior::Fail => return Err("backend unavailable".into()),
            Behavior::Panic => panic!("handler exploded"),
            Behavior::Block(latch) => latch.notified().await,
        }

        let code = match request.code {
            Code::AccountingRequest => Code::AccountingResponse,
            _ => Code::AccessAccept,
        };
        Ok(HandlerDecision::Reply(ReplyParams::new(code)))
    }
}

const SECRET: &[u8] = b"testing123";

/// Server bound to a loopback port with the given handler behind 127.0.0.0/8
async fn start_server(handler: Arc<TestHandler>) -> Arc<RadiusServer> {
    start_server_with(handler, |config| config).await
}

async fn start_server_with(
    handler: Arc<TestHandler>,
    customize: impl FnOnce(ServerConfig) -> ServerConfig,
) -> Arc<RadiusServer> {
    let mut registry = StaticNasRegistry::new();
    registry.register(NasRegistration::new(
        "127.0.0.0/8".parse().unwrap(),
        SECRET,
        "default",
        handler,
    ));

    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), Arc::new(registry))
        .with_resend_timeout(Duration::from_millis(400));
    let config = customize(config);

    let server = Arc::new(RadiusServer::new(config).await.expect("bind server"));
    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = runner.run().await;
    });
    server
}

fn access_request_bytes(identifier: u8) -> Vec<u8> {
    let mut packet = Packet::new(
        Code::AccessRequest,
        identifier,
        generate_request_authenticator(),
    );
    packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
    packet.encode().unwrap()
}

fn accounting_request_bytes(identifier: u8) -> Vec<u8> {
    let packet = Packet::new(Code::AccountingRequest, identifier, [0u8; 16]);
    let mut bytes = packet.encode().unwrap();
    let auth = calculate_request_authenticator(&bytes, SECRET);
    bytes[4..20].copy_from_slice(&auth);
    bytes
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind client")
}

async fn recv_reply(socket: &UdpSocket) -> Option<Vec<u8>> {
    let mut buf = [0u8; 4096];
    match timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

async fn expect_silence(socket: &UdpSocket) {
    let mut buf = [0u8; 4096];
    let result = timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await;
    assert!(result.is_err(), "expected no datagram, got one");
}

fn server_addr(server: &RadiusServer) -> SocketAddr {
    server.local_addr().expect("server address")
}

#[tokio::test]
async fn normal_round_trip() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    let request = access_request_bytes(7);
    socket.send_to(&request, server_addr(&server)).await.unwrap();

    let reply = recv_reply(&socket).await.expect("reply");
    let decoded = Packet::decode(&reply).unwrap();
    assert_eq!(decoded.code, Code::AccessAccept);
    assert_eq!(decoded.identifier, 7);
    assert_eq!(handler.invocations(), 1);

    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).expect("nas counters");
    assert_eq!(nas.requests, 1);
    assert_eq!(nas.access_requests, 1);
    assert_eq!(nas.access_accepts, 1);
    assert_eq!(nas.dup_requests, 0);
}

#[tokio::test]
async fn duplicate_while_handling_is_swallowed() {
    let latch = Arc::new(Notify::new());
    let handler = TestHandler::new(Behavior::Block(Arc::clone(&latch)));
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    let request = access_request_bytes(7);
    let addr = server_addr(&server);
    socket.send_to(&request, addr).await.unwrap();
    socket.send_to(&request, addr).await.unwrap();

    // Both datagrams are ingested; the handler is still parked
    tokio::time::sleep(Duration::from_millis(150)).await;
    latch.notify_one();

    let reply = recv_reply(&socket).await.expect("reply after release");
    assert_eq!(Packet::decode(&reply).unwrap().code, Code::AccessAccept);

    // Exactly one handler run, exactly one reply
    assert_eq!(handler.invocations(), 1);
    expect_silence(&socket).await;

    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.requests, 1);
    assert_eq!(nas.dup_requests, 1);
}

#[tokio::test]
async fn duplicate_after_reply_resends_identical_bytes() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    let request = access_request_bytes(7);
    let addr = server_addr(&server);
    socket.send_to(&request, addr).await.unwrap();
    let first = recv_reply(&socket).await.expect("first reply");

    // Let the listener process the worker's replied signal before the
    // duplicate lands
    tokio::time::sleep(Duration::from_millis(50)).await;
    socket.send_to(&request, addr).await.unwrap();
    let second = recv_reply(&socket).await.expect("retransmitted reply");

    assert_eq!(first, second, "retransmission must be byte-identical");
    assert_eq!(handler.invocations(), 1);

    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.dup_requests, 1);
}

#[tokio::test]
async fn retention_expires_and_key_is_reusable() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    let request = access_request_bytes(9);
    let addr = server_addr(&server);
    socket.send_to(&request, addr).await.unwrap();
    assert!(recv_reply(&socket).await.is_some());

    // Past the 400 ms retention window the key is forgotten and the same
    // bytes are a brand new request
    tokio::time::sleep(Duration::from_millis(600)).await;
    socket.send_to(&request, addr).await.unwrap();
    assert!(recv_reply(&socket).await.is_some());

    assert_eq!(handler.invocations(), 2);
    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.requests, 2);
    assert_eq!(nas.dup_requests, 0);
}

#[tokio::test]
async fn retransmission_budget_is_capped() {
    let handler = TestHandler::new(Behavior::Accept);
    // Long retention so the budget, not the timer, ends the transaction
    let server = start_server_with(Arc::clone(&handler), |config| {
        config.with_resend_timeout(Duration::from_secs(5))
    })
    .await;
    let socket = client().await;

    let request = access_request_bytes(3);
    let addr = server_addr(&server);
    socket.send_to(&request, addr).await.unwrap();
    assert!(recv_reply(&socket).await.is_some());

    // Three duplicates exhaust the retry budget and end the retention
    // early; the fourth duplicate therefore starts a fresh transaction
    // even though the 5 second window has not elapsed
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(80)).await;
        socket.send_to(&request, addr).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(
        handler.invocations(),
        2,
        "the retry cap must force the transaction out after 3 resends"
    );
}

#[tokio::test]
async fn unknown_nas_is_discarded() {
    let handler = TestHandler::new(Behavior::Accept);

    // Registry covering an address range the client is not in
    let mut registry = StaticNasRegistry::new();
    registry.register(NasRegistration::new(
        "10.99.0.0/16".parse().unwrap(),
        SECRET,
        "default",
        Arc::clone(&handler) as Arc<dyn RadiusHandler>,
    ));
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), Arc::new(registry));
    let server = Arc::new(RadiusServer::new(config).await.unwrap());
    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    let socket = client().await;
    socket
        .send_to(&access_request_bytes(1), server_addr(&server))
        .await
        .unwrap();

    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 0);
    assert_eq!(server.stats(StatsKind::Read).invalid_requests, 1);
}

#[tokio::test]
async fn runt_datagram_is_discarded() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    socket.send_to(&[1u8], server_addr(&server)).await.unwrap();

    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 0);
    assert_eq!(server.stats(StatsKind::Read).invalid_requests, 1);
}

#[tokio::test]
async fn undecodable_packet_counts_malformed() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    // Two bytes pass the listener's minimum but fail the codec
    socket
        .send_to(&[1u8, 42], server_addr(&server))
        .await
        .unwrap();

    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 0);
    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.malformed_requests, 1);
}

#[tokio::test]
async fn no_available_node_discards_without_invocation() {
    let handler = TestHandler::new(Behavior::Accept);

    let mut registry = StaticNasRegistry::new();
    registry.register(
        NasRegistration::new(
            "127.0.0.0/8".parse().unwrap(),
            SECRET,
            "default",
            Arc::clone(&handler) as Arc<dyn RadiusHandler>,
        )
        .with_nodes([NodeId::from("n2")]),
    );

    // Monitor only knows the local node, so the preference set never
    // intersects the advertisement
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), Arc::new(registry));
    let server = Arc::new(RadiusServer::new(config).await.unwrap());
    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    let socket = client().await;
    socket
        .send_to(&access_request_bytes(5), server_addr(&server))
        .await
        .unwrap();

    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 0);
    assert_eq!(server.stats(StatsKind::Read).discard_no_handler, 1);
}

struct FailingRemote;

#[async_trait]
impl RemoteRunner for FailingRemote {
    async fn invoke(
        &self,
        _node: &NodeId,
        _module: &str,
        _invocation: RemoteInvocation,
    ) -> Result<RemoteDecision, RemoteError> {
        Err(RemoteError::Failed("connection refused".to_string()))
    }
}

#[tokio::test]
async fn unreachable_remote_counts_handler_failure() {
    let handler = TestHandler::new(Behavior::Accept);

    let mut registry = StaticNasRegistry::new();
    registry.register(
        NasRegistration::new(
            "127.0.0.0/8".parse().unwrap(),
            SECRET,
            "default",
            Arc::clone(&handler) as Arc<dyn RadiusHandler>,
        )
        .with_nodes([NodeId::from("n2")]),
    );

    let monitor = StaticNodeMonitor::new(NodeId::from("local"));
    monitor.advertise("default", [NodeId::from("n2")]);

    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap(), Arc::new(registry))
        .with_monitor(Arc::new(monitor))
        .with_remote(Arc::new(FailingRemote));
    let server = Arc::new(RadiusServer::new(config).await.unwrap());
    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = runner.run().await;
    });

    let socket = client().await;
    socket
        .send_to(&access_request_bytes(8), server_addr(&server))
        .await
        .unwrap();

    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 0);
    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.handler_failure, 1);
}

#[tokio::test]
async fn panicking_handler_leaves_server_healthy() {
    let handler = TestHandler::new(Behavior::Panic);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;
    let addr = server_addr(&server);

    socket.send_to(&access_request_bytes(11), addr).await.unwrap();
    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 1);

    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.handler_failure, 1);

    // The transaction was cleaned up: the same identifier handles afresh,
    // and the socket is still alive
    socket.send_to(&access_request_bytes(11), addr).await.unwrap();
    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 2);
}

#[tokio::test]
async fn noreply_sends_nothing() {
    let handler = TestHandler::new(Behavior::NoReply);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    socket
        .send_to(&access_request_bytes(2), server_addr(&server))
        .await
        .unwrap();

    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 1);

    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.access_accepts, 0);
    assert_eq!(nas.handler_failure, 0);
}

#[tokio::test]
async fn failing_handler_counts_failure() {
    let handler = TestHandler::new(Behavior::Fail);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    socket
        .send_to(&access_request_bytes(2), server_addr(&server))
        .await
        .unwrap();

    expect_silence(&socket).await;
    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.handler_failure, 1);
}

#[tokio::test]
async fn admission_refusal_drops_packets() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server_with(Arc::clone(&handler), |config| {
        config.with_admission(AdmissionConfig {
            rate_per_sec: 1,
            burst: 1,
            max_in_flight: 64,
        })
    })
    .await;
    let socket = client().await;
    let addr = server_addr(&server);

    // First request takes the only token; the second is refused
    socket.send_to(&access_request_bytes(1), addr).await.unwrap();
    assert!(recv_reply(&socket).await.is_some());
    socket.send_to(&access_request_bytes(2), addr).await.unwrap();
    expect_silence(&socket).await;

    assert_eq!(handler.invocations(), 1);
    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.packets_dropped, 1);
}

#[tokio::test]
async fn accounting_round_trip() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    socket
        .send_to(&accounting_request_bytes(21), server_addr(&server))
        .await
        .unwrap();

    let reply = recv_reply(&socket).await.expect("accounting response");
    let decoded = Packet::decode(&reply).unwrap();
    assert_eq!(decoded.code, Code::AccountingResponse);
    assert_eq!(decoded.identifier, 21);

    let stats = server.stats(StatsKind::Read);
    let nas = stats.nas("127.0.0.1".parse().unwrap()).unwrap();
    assert_eq!(nas.account_requests, 1);
    assert_eq!(nas.account_responses, 1);
}

#[tokio::test]
async fn reply_carries_message_authenticator_when_request_did() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    // Build a request with a valid Message-Authenticator
    let mut packet = Packet::new(Code::AccessRequest, 4, generate_request_authenticator());
    packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
    packet.add_attribute(
        Attribute::new(AttributeType::MessageAuthenticator as u8, vec![0u8; 16]).unwrap(),
    );
    let mut request = packet.encode().unwrap();
    let offset = request.len() - 16;
    let hmac = radgate_proto::calculate_message_authenticator(&request, SECRET);
    request[offset..].copy_from_slice(&hmac);

    socket.send_to(&request, server_addr(&server)).await.unwrap();

    let reply = recv_reply(&socket).await.expect("reply");
    let decoded = Packet::decode(&reply).unwrap();
    assert!(
        decoded
            .find_attribute(AttributeType::MessageAuthenticator as u8)
            .is_some(),
        "reply must echo Message-Authenticator protection"
    );
}

#[tokio::test]
async fn stats_pull_zeroes_counters() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;

    socket
        .send_to(&access_request_bytes(1), server_addr(&server))
        .await
        .unwrap();
    assert!(recv_reply(&socket).await.is_some());

    let pulled = server.stats(StatsKind::Pull);
    assert_eq!(pulled.nas("127.0.0.1".parse().unwrap()).unwrap().requests, 1);

    let after = server.stats(StatsKind::Read);
    assert_eq!(after.nas("127.0.0.1".parse().unwrap()).unwrap().requests, 0);
}

#[tokio::test]
async fn shutdown_stops_the_listener() {
    let handler = TestHandler::new(Behavior::Accept);
    let server = start_server(Arc::clone(&handler)).await;
    let socket = client().await;
    let addr = server_addr(&server);

    server.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;

    socket.send_to(&access_request_bytes(1), addr).await.unwrap();
    expect_silence(&socket).await;
    assert_eq!(handler.invocations(), 0);
}
