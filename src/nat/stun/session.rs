// src/nat/stun/session.rs
//! UDP transport session used by the behavior tests.
//!
//! One session owns one ephemeral UDP socket. A background task reads every
//! datagram, decodes it and hands it over a capacity-one channel; the test
//! logic issues one probe at a time and races that channel against a timer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use bytes::BytesMut;
use serde::Serialize;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::nat::error::{NatError, NatResult};
use crate::nat::logger::LeveledLogger;
use super::protocol::*;
use super::uri::{Uri, SCHEME};

/// Default wait for a reply to one probe
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default receive buffer, one Ethernet MTU
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1500;

/// Default STUN port (RFC 8489 Section 18.5)
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Address family used for the server address and the local socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
}

impl AddressFamily {
    fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long one round trip waits for a reply
    pub timeout: Duration,

    /// Largest datagram the receive loop accepts
    pub recv_buffer_size: usize,

    /// Which resolved server address to use
    pub family: AddressFamily,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            family: AddressFamily::V4,
        }
    }
}

/// Result of one request/response exchange that did not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum RoundTripOutcome {
    /// A decoded reply to the probe
    Reply(Message),

    /// Nothing arrived before the timeout
    Timeout,
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub requests_sent: u64,
    pub replies_received: u64,
    pub timeouts: u64,
}

/// What a behavior test needs from a session
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Address the local socket is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Primary address of the server under test
    fn server_addr(&self) -> SocketAddr;

    /// Secondary server address learned from OTHER-ADDRESS
    fn other_addr(&self) -> Option<SocketAddr>;

    fn set_other_addr(&mut self, addr: SocketAddr);

    /// How long one round trip waits for a reply
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Send `request` (with a fresh transaction id) to `destination` and wait for one reply.
    ///
    /// `Err` means the transport itself failed; a missing reply is `Ok(RoundTripOutcome::Timeout)`.
    async fn round_trip(
        &mut self,
        request: &mut Message,
        destination: SocketAddr,
    ) -> NatResult<RoundTripOutcome>;

    /// Release the underlying resources. Calling it twice is harmless.
    fn close(&mut self) {}
}

/// Opens one transport per behavior test
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Transport: Transport;

    async fn connect(&self, server: SocketAddr) -> NatResult<Self::Transport>;
}

/// Connector producing real UDP sessions
#[derive(Clone)]
pub struct UdpConnector {
    config: SessionConfig,
    logger: Arc<dyn LeveledLogger>,
}

impl UdpConnector {
    pub fn new(config: SessionConfig, logger: Arc<dyn LeveledLogger>) -> Self {
        Self { config, logger }
    }
}

impl Connector for UdpConnector {
    type Transport = StunSession;

    async fn connect(&self, server: SocketAddr) -> NatResult<StunSession> {
        self.logger.info(format_args!("connecting to STUN server: {}", server));
        StunSession::open(server, self.config.clone(), self.logger.clone()).await
    }
}

/// Resolve a server given as `host:port`, `ip:port`, `[v6]:port` or a `stun:` URI
pub async fn resolve_server(server: &str, family: AddressFamily) -> NatResult<SocketAddr> {
    let target = if Uri::looks_like_uri(server) {
        let uri = Uri::parse(server)?;
        if uri.scheme != SCHEME {
            return Err(NatError::Configuration(format!(
                "{} URIs need STUN over TLS, which is not supported", uri.scheme
            )));
        }
        let host = if uri.host.contains(':') { format!("[{}]", uri.host) } else { uri.host.clone() };
        format!("{}:{}", host, uri.port.unwrap_or(DEFAULT_STUN_PORT))
    } else {
        server.to_string()
    };

    if let Ok(addr) = target.parse::<SocketAddr>() {
        return if family.matches(&addr) {
            Ok(addr)
        } else {
            Err(NatError::Configuration(format!("{} is not an {:?} address", addr, family)))
        };
    }

    let mut addrs = lookup_host(target.as_str())
        .await
        .map_err(|e| NatError::DnsResolution(format!("{}: {}", target, e)))?;

    addrs
        .find(|addr| family.matches(addr))
        .ok_or_else(|| NatError::DnsResolution(format!("{}: no {:?} address", target, family)))
}

/// UDP session against one STUN server
pub struct StunSession {
    socket: Option<Arc<UdpSocket>>,
    local_addr: SocketAddr,
    server_addr: SocketAddr,
    other_addr: Option<SocketAddr>,
    messages: mpsc::Receiver<Message>,
    listener: Option<JoinHandle<()>>,
    config: SessionConfig,
    stats: SessionStats,
    transaction_ids: Vec<TransactionId>,
    logger: Arc<dyn LeveledLogger>,
}

impl StunSession {
    /// Bind an ephemeral socket of the server's family and start the receive loop
    pub async fn open(
        server_addr: SocketAddr,
        config: SessionConfig,
        logger: Arc<dyn LeveledLogger>,
    ) -> NatResult<Self> {
        let bind_addr: SocketAddr = match server_addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let bound = socket.local_addr()?;

        // The socket is bound to the unspecified address; report the one
        // the server route actually uses so the no-NAT check can match
        let local_addr = match routed_local_ip(bind_addr, server_addr).await {
            Some(ip) => SocketAddr::new(ip, bound.port()),
            None => bound,
        };
        logger.info(format_args!("Local address: {}", local_addr));
        logger.info(format_args!("Remote address: {}", server_addr));

        let (tx, rx) = mpsc::channel(1);
        let listener = tokio::spawn(listen(
            socket.clone(),
            tx,
            config.recv_buffer_size,
            logger.clone(),
        ));

        Ok(Self {
            socket: Some(socket),
            local_addr,
            server_addr,
            other_addr: None,
            messages: rx,
            listener: Some(listener),
            config,
            stats: SessionStats::default(),
            transaction_ids: Vec::new(),
            logger,
        })
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Transaction ids of every probe sent so far, oldest first
    pub fn transaction_ids(&self) -> &[TransactionId] {
        &self.transaction_ids
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }
}

impl Transport for StunSession {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    fn other_addr(&self) -> Option<SocketAddr> {
        self.other_addr
    }

    fn set_other_addr(&mut self, addr: SocketAddr) {
        self.other_addr = Some(addr);
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn round_trip(
        &mut self,
        request: &mut Message,
        destination: SocketAddr,
    ) -> NatResult<RoundTripOutcome> {
        let socket = self.socket.clone().ok_or(NatError::ChannelClosed)?;

        // A reply that arrived after the previous probe timed out must not answer this one
        while let Ok(stale) = self.messages.try_recv() {
            self.logger.debug(format_args!("Discarding stale response {}", stale));
        }

        let tid = request.new_transaction_id();
        self.transaction_ids.push(tid);
        let encoded = request.encode()?;

        self.logger.info(format_args!("Sending to {}: ({} bytes)", destination, encoded.len()));
        self.logger.debug(format_args!("{}", request));
        for attr in &request.attributes {
            self.logger.debug(format_args!("\t{} (l={})", attr.attr_type, attr.value_len()));
        }

        if let Err(e) = socket.send_to(&encoded, destination).await {
            self.logger.warn(format_args!("Error sending request to {}", destination));
            return Err(e.into());
        }
        self.stats.requests_sent += 1;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            match timeout_at(deadline, self.messages.recv()).await {
                Ok(Some(message)) if message.transaction_id == tid => {
                    self.stats.replies_received += 1;
                    return Ok(RoundTripOutcome::Reply(message));
                }
                Ok(Some(message)) => {
                    self.logger.debug(format_args!(
                        "Discarding response with unexpected transaction id {}",
                        message.transaction_id
                    ));
                }
                Ok(None) => return Err(NatError::ChannelClosed),
                Err(_) => {
                    self.logger.info(format_args!(
                        "Timed out waiting for response from server {}",
                        destination
                    ));
                    self.stats.timeouts += 1;
                    return Ok(RoundTripOutcome::Timeout);
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.socket = None;
    }
}

impl Drop for StunSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Local IP the OS picks to reach `server`, read from a connected throwaway socket
async fn routed_local_ip(bind_addr: SocketAddr, server: SocketAddr) -> Option<IpAddr> {
    let socket = UdpSocket::bind(bind_addr).await.ok()?;
    socket.connect(server).await.ok()?;
    Some(socket.local_addr().ok()?.ip())
}

/// Receive loop: decode every datagram and hand it to the pending round trip.
///
/// Any socket or decode error ends the loop, which closes the channel.
async fn listen(
    socket: Arc<UdpSocket>,
    messages: mpsc::Sender<Message>,
    buffer_size: usize,
    logger: Arc<dyn LeveledLogger>,
) {
    let mut buf = vec![0u8; buffer_size];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                logger.info(format_args!("Error reading from socket: {}", e));
                return;
            }
        };
        logger.info(format_args!("Response from {}: ({} bytes)", from, len));

        let message = match Message::decode(BytesMut::from(&buf[..len])) {
            Ok(message) => message,
            Err(e) => {
                logger.info(format_args!("Error decoding message: {}", e));
                return;
            }
        };

        if messages.send(message).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::nat::logger::{CapturingLogger, NullLogger};
    use crate::nat::stun::utils::MessageBuilder;

    fn quick_config() -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        }
    }

    /// Echo server answering every request with the sender's address
    async fn spawn_echo_server() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let request = Message::decode(BytesMut::from(&buf[..len])).unwrap();
                let reply = MessageBuilder::binding_response(request.transaction_id)
                    .with_xor_mapped_address(from)
                    .build();
                let _ = socket.send_to(&reply.encode().unwrap(), from).await;
            }
        });

        addr
    }

    /// Server answering the n-th request after `delays[n]`, ignoring any further ones
    async fn spawn_delayed_server(delays: Vec<Duration>) -> SocketAddr {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            for delay in delays {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let request = Message::decode(BytesMut::from(&buf[..len])).unwrap();
                let reply = MessageBuilder::binding_response(request.transaction_id)
                    .with_xor_mapped_address(from)
                    .build();

                let socket = socket.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = socket.send_to(&reply.encode().unwrap(), from).await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_round_trip_reply() {
        let server = spawn_echo_server().await;
        let mut session = StunSession::open(server, quick_config(), Arc::new(NullLogger)).await.unwrap();

        let mut request = Message::binding_request();
        let outcome = session.round_trip(&mut request, server).await.unwrap();

        match outcome {
            RoundTripOutcome::Reply(reply) => {
                assert_eq!(reply.transaction_id, request.transaction_id);
                assert_eq!(reply.message_type, MessageType::BindingResponse);
            }
            RoundTripOutcome::Timeout => panic!("expected a reply"),
        }
        assert_eq!(session.stats().replies_received, 1);
    }

    #[tokio::test]
    async fn test_round_trip_timeout() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = silent.local_addr().unwrap();

        let mut session = StunSession::open(server, quick_config(), Arc::new(NullLogger)).await.unwrap();
        let mut request = Message::binding_request();

        let outcome = session.round_trip(&mut request, server).await.unwrap();
        assert_eq!(outcome, RoundTripOutcome::Timeout);
        assert_eq!(session.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_late_reply_during_next_round_trip_is_discarded() {
        // Reply 1 lands inside round trip 2, before reply 2
        let server = spawn_delayed_server(vec![
            Duration::from_millis(550),
            Duration::from_millis(300),
        ])
        .await;
        let config = SessionConfig {
            timeout: Duration::from_millis(400),
            ..SessionConfig::default()
        };
        let logger = CapturingLogger::new();
        let mut session = StunSession::open(server, config, logger.clone()).await.unwrap();

        let mut request = Message::binding_request();
        assert_eq!(session.round_trip(&mut request, server).await.unwrap(), RoundTripOutcome::Timeout);

        match session.round_trip(&mut request, server).await.unwrap() {
            RoundTripOutcome::Reply(reply) => {
                assert_eq!(reply.transaction_id, request.transaction_id);
                assert_eq!(reply.transaction_id, session.transaction_ids()[1]);
            }
            RoundTripOutcome::Timeout => panic!("expected the second reply"),
        }

        assert!(logger.contains("Discarding response with unexpected transaction id"));
        assert_eq!(session.stats().replies_received, 1);
        assert_eq!(session.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_stale_reply_drained_before_next_send() {
        let server = spawn_delayed_server(vec![
            Duration::from_millis(300),
            Duration::ZERO,
        ])
        .await;
        let config = SessionConfig {
            timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        };
        let logger = CapturingLogger::new();
        let mut session = StunSession::open(server, config, logger.clone()).await.unwrap();

        let mut request = Message::binding_request();
        assert_eq!(session.round_trip(&mut request, server).await.unwrap(), RoundTripOutcome::Timeout);

        // Let the late reply reach the channel while nothing is waiting
        tokio::time::sleep(Duration::from_millis(250)).await;

        match session.round_trip(&mut request, server).await.unwrap() {
            RoundTripOutcome::Reply(reply) => assert_eq!(reply.transaction_id, session.transaction_ids()[1]),
            RoundTripOutcome::Timeout => panic!("expected the second reply"),
        }
        assert!(logger.contains("Discarding stale response"));
    }

    #[tokio::test]
    async fn test_local_addr_is_routed_address() {
        let server = spawn_echo_server().await;
        let session = StunSession::open(server, quick_config(), Arc::new(NullLogger)).await.unwrap();

        let local = session.local_addr();
        assert_eq!(local.ip(), server.ip());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_transaction_ids_never_reused() {
        let server = spawn_echo_server().await;
        let mut session = StunSession::open(server, quick_config(), Arc::new(NullLogger)).await.unwrap();

        // The same request value is sent repeatedly
        let mut request = Message::binding_request();
        for _ in 0..5 {
            session.round_trip(&mut request, server).await.unwrap();
        }

        let ids: HashSet<_> = session.transaction_ids().iter().collect();
        assert_eq!(session.transaction_ids().len(), 5);
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn test_undecodable_datagram_closes_session() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            if let Ok((_, from)) = server.recv_from(&mut buf).await {
                let _ = server.send_to(b"definitely not stun", from).await;
            }
        });

        let mut session = StunSession::open(server_addr, quick_config(), Arc::new(NullLogger)).await.unwrap();
        let mut request = Message::binding_request();

        let err = session.round_trip(&mut request, server_addr).await.unwrap_err();
        assert!(matches!(err, NatError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = spawn_echo_server().await;
        let mut session = StunSession::open(server, quick_config(), Arc::new(NullLogger)).await.unwrap();

        session.close();
        session.close();
        assert!(session.is_closed());

        let mut request = Message::binding_request();
        assert!(matches!(
            session.round_trip(&mut request, server).await,
            Err(NatError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_resolve_server_forms() {
        let addr = resolve_server("127.0.0.1:3478", AddressFamily::V4).await.unwrap();
        assert_eq!(addr, "127.0.0.1:3478".parse().unwrap());

        let addr = resolve_server("stun:127.0.0.1", AddressFamily::V4).await.unwrap();
        assert_eq!(addr, "127.0.0.1:3478".parse().unwrap());

        let addr = resolve_server("stun:127.0.0.1:19302", AddressFamily::V4).await.unwrap();
        assert_eq!(addr.port(), 19302);

        let addr = resolve_server("stun:127.0.0.1:0", AddressFamily::V4).await.unwrap();
        assert_eq!(addr.port(), DEFAULT_STUN_PORT);

        let addr = resolve_server("stun:[::1]:3479", AddressFamily::V6).await.unwrap();
        assert_eq!(addr, "[::1]:3479".parse().unwrap());

        assert!(matches!(
            resolve_server("stuns:127.0.0.1", AddressFamily::V4).await,
            Err(NatError::Configuration(_))
        ));
        assert!(matches!(
            resolve_server("[::1]:3478", AddressFamily::V4).await,
            Err(NatError::Configuration(_))
        ));
        assert!(resolve_server("http://example.com", AddressFamily::V4).await.is_err());
    }
}
