//! Datagram transport session
//!
//! Owns one UDP socket, runs a receive loop that hands every datagram to a
//! callback, and sends fire-and-forget to whichever peer is currently
//! reachable. Only one remote peer is active at a time.

use bytes::Bytes;
use parking_lot::RwLock;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{BindMode, NetworkConfig};
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;
use crate::network::udp::create_socket;

/// Callback invoked with each received datagram and its source
pub type PacketHandler = Arc<dyn Fn(&[u8], SocketAddr) + Send + Sync>;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
}

#[derive(Debug, Default)]
struct Counters {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    sends_dropped: AtomicU64,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    receive_errors: AtomicU64,
}

/// Snapshot of transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub sends_dropped: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub receive_errors: u64,
}

/// Open socket plus routing state for one run of the session
struct Link {
    socket: Arc<UdpSocket>,
    runtime: Handle,
    /// Socket was pre-associated with the configured remote
    associated: bool,
    configured_remote: Option<SocketAddr>,
    learned_remote: RwLock<Option<SocketAddr>>,
    closing: AtomicBool,
    counters: Arc<Counters>,
}

/// Where a send goes
enum Destination {
    Associated,
    Address(SocketAddr),
}

impl Link {
    fn destination(&self) -> Option<Destination> {
        if self.associated {
            return Some(Destination::Associated);
        }
        let learned = *self.learned_remote.read();
        learned.or(self.configured_remote).map(Destination::Address)
    }

    fn send(&self, payload: Bytes) {
        let Some(destination) = self.destination() else {
            tracing::warn!("No remote endpoint known, dropping {} byte datagram", payload.len());
            self.counters.sends_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let socket = self.socket.clone();
        let counters = self.counters.clone();
        self.runtime.spawn(async move {
            let result = match destination {
                Destination::Associated => socket.send(&payload).await,
                Destination::Address(addr) => socket.send_to(&payload, addr).await,
            };
            match result {
                Ok(sent) => {
                    counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                    counters.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!("Datagram send failed: {}", e);
                    counters.sends_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }
}

/// Cloneable send handle that outlives restarts of its session
#[derive(Clone)]
pub struct DatagramSender {
    link: Arc<RwLock<Option<Arc<Link>>>>,
    counters: Arc<Counters>,
}

impl DatagramSender {
    /// Queue `payload` for sending and return immediately.
    ///
    /// There is no delivery guarantee; the datagram is dropped with a
    /// warning when the session is stopped or no destination is known.
    pub fn send(&self, payload: Bytes) {
        let link = self.link.read().clone();
        match link {
            Some(link) => link.send(payload),
            None => {
                tracing::warn!("Session not running, dropping {} byte datagram", payload.len());
                self.counters.sends_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

struct Active {
    link: Arc<Link>,
    shutdown: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

/// A single UDP socket with a continuous receive loop
pub struct DatagramSession {
    config: NetworkConfig,
    handler: PacketHandler,
    state: SessionState,
    active: Option<Active>,
    current: Arc<RwLock<Option<Arc<Link>>>>,
    counters: Arc<Counters>,
}

impl DatagramSession {
    /// Create a stopped session; `handler` receives every datagram
    pub fn new(config: NetworkConfig, handler: PacketHandler) -> Self {
        Self {
            config,
            handler,
            state: SessionState::Stopped,
            active: None,
            current: Arc::new(RwLock::new(None)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Open the socket and start the receive loop.
    ///
    /// Starting a running session stops it first. On failure the session
    /// stays stopped and nothing remains open.
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        if self.state != SessionState::Stopped {
            self.stop();
        }
        self.state = SessionState::Starting;

        let link = match self.open().await {
            Ok(link) => Arc::new(link),
            Err(e) => {
                tracing::error!("Failed to start datagram session: {}", e);
                self.state = SessionState::Stopped;
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(receive_loop(
            link.clone(),
            self.handler.clone(),
            shutdown_rx,
            self.config.retry_delay(),
        ));

        *self.current.write() = Some(link.clone());
        self.active = Some(Active {
            link,
            shutdown: shutdown_tx,
            _task: task,
        });
        self.state = SessionState::Running;

        tracing::info!(
            "Datagram session running on {} ({:?} mode)",
            self.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            self.config.bind_mode
        );
        Ok(())
    }

    async fn open(&self) -> Result<Link, NetworkError> {
        // Unbound mode has nobody to learn from, so its remote must resolve
        let configured_remote = match &self.config.remote_address {
            Some(host) => match resolve(host, self.config.remote_port).await {
                Ok(addr) => Some(addr),
                Err(e) if self.config.bind_mode == BindMode::Unbound => return Err(e),
                Err(e) => {
                    tracing::warn!("{}, waiting for a peer to send first", e);
                    None
                }
            },
            None => None,
        };

        let bind_addr = match self.config.bind_mode {
            BindMode::Bound => {
                let ip: IpAddr = self.config.bind_address.parse().map_err(|_| {
                    NetworkError::BindFailed(format!("invalid bind address {}", self.config.bind_address))
                })?;
                SocketAddr::new(ip, self.config.local_port)
            }
            BindMode::Unbound => {
                let ip = match configured_remote {
                    Some(SocketAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                    _ => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                };
                SocketAddr::new(ip, 0)
            }
        };

        let socket = create_socket(bind_addr, &self.config)
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

        let mut associated = false;
        if let (BindMode::Unbound, Some(remote)) = (self.config.bind_mode, configured_remote) {
            match socket.connect(remote).await {
                Ok(()) => associated = true,
                Err(e) => {
                    tracing::warn!("Could not associate with {}, using explicit addressing: {}", remote, e)
                }
            }
        }

        Ok(Link {
            socket: Arc::new(socket),
            runtime: Handle::current(),
            associated,
            configured_remote,
            learned_remote: RwLock::new(None),
            closing: AtomicBool::new(false),
            counters: self.counters.clone(),
        })
    }

    /// Cancel the receive loop and close the socket. Safe to call repeatedly.
    pub fn stop(&mut self) {
        *self.current.write() = None;

        if let Some(active) = self.active.take() {
            active.link.closing.store(true, Ordering::SeqCst);
            *active.link.learned_remote.write() = None;
            let _ = active.shutdown.send(());
            tracing::info!("Datagram session stopped");
        }

        self.state = SessionState::Stopped;
    }

    /// Send without waiting; see [`DatagramSender::send`]
    pub fn send(&self, payload: Bytes) {
        self.sender().send(payload);
    }

    /// Handle for sending from other tasks or threads
    pub fn sender(&self) -> DatagramSender {
        DatagramSender {
            link: self.current.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().and_then(|a| a.link.socket.local_addr().ok())
    }

    /// Source of the most recently received datagram
    pub fn learned_remote(&self) -> Option<SocketAddr> {
        self.active.as_ref().and_then(|a| *a.link.learned_remote.read())
    }

    /// Whether sends use the pre-associated remote
    pub fn is_associated(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.link.associated)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Get statistics
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            sends_dropped: self.counters.sends_dropped.load(Ordering::Relaxed),
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            receive_errors: self.counters.receive_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DatagramSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| NetworkError::ResolveFailed(format!("{}:{}: {}", host, port, e)))?;
    addrs
        .next()
        .ok_or_else(|| NetworkError::ResolveFailed(format!("{}:{} has no addresses", host, port)))
}

async fn receive_loop(
    link: Arc<Link>,
    handler: PacketHandler,
    mut shutdown: oneshot::Receiver<()>,
    retry_delay: std::time::Duration,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = tokio::select! {
            _ = &mut shutdown => break,
            received = link.socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, source)) => {
                let previous = link.learned_remote.write().replace(source);
                if previous != Some(source) {
                    tracing::debug!("Remote endpoint is now {}", source);
                }

                link.counters.packets_received.fetch_add(1, Ordering::Relaxed);
                link.counters.bytes_received.fetch_add(len as u64, Ordering::Relaxed);

                handler(&buf[..len], source);
            }
            Err(e) => {
                if link.closing.load(Ordering::SeqCst) {
                    break;
                }
                tracing::warn!("Datagram receive failed, retrying: {}", e);
                link.counters.receive_errors.fetch_add(1, Ordering::Relaxed);

                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }

    tracing::debug!("Receive loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    type Received = mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>;

    fn channel_handler() -> (PacketHandler, Received) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: PacketHandler = Arc::new(move |data: &[u8], source: SocketAddr| {
            let _ = tx.send((data.to_vec(), source));
        });
        (handler, rx)
    }

    fn loopback_listener() -> NetworkConfig {
        NetworkConfig {
            bind_address: "127.0.0.1".to_string(),
            ..NetworkConfig::listener(0)
        }
    }

    async fn recv_text(socket: &UdpSocket) -> (String, SocketAddr) {
        let mut buf = [0u8; 256];
        let (len, from) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out")
            .unwrap();
        (String::from_utf8_lossy(&buf[..len]).into_owned(), from)
    }

    #[tokio::test]
    async fn test_bound_mode_follows_latest_sender() {
        let (handler, mut received) = channel_handler();
        let mut session = DatagramSession::new(loopback_listener(), handler);
        session.start().await.unwrap();
        let addr = session.local_addr().unwrap();

        let peer_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Nobody to talk to yet
        session.send(Bytes::from_static(b"lost"));
        assert_eq!(session.stats().sends_dropped, 1);

        peer_a.send_to(b"hello from a", addr).await.unwrap();
        let (data, source) = timeout(Duration::from_secs(2), received.recv()).await.unwrap().unwrap();
        assert_eq!(data, b"hello from a");
        assert_eq!(source, peer_a.local_addr().unwrap());
        assert_eq!(session.learned_remote(), Some(source));

        session.send(Bytes::from_static(b"to a"));
        let (text, from) = recv_text(&peer_a).await;
        assert_eq!(text, "to a");
        assert_eq!(from, addr);

        peer_b.send_to(b"hello from b", addr).await.unwrap();
        let (_, source) = timeout(Duration::from_secs(2), received.recv()).await.unwrap().unwrap();
        assert_eq!(source, peer_b.local_addr().unwrap());

        session.send(Bytes::from_static(b"to b"));
        let (text, _) = recv_text(&peer_b).await;
        assert_eq!(text, "to b");

        let mut buf = [0u8; 64];
        assert!(timeout(Duration::from_millis(200), peer_a.recv_from(&mut buf)).await.is_err());

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.learned_remote(), None);
        session.stop();
    }

    #[tokio::test]
    async fn test_unbound_mode_associates_with_remote() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listener_addr = listener.local_addr().unwrap();

        let (handler, mut received) = channel_handler();
        let mut session = DatagramSession::new(
            NetworkConfig::peer("127.0.0.1", listener_addr.port()),
            handler,
        );
        session.start().await.unwrap();
        assert!(session.is_associated());

        session.send(Bytes::from_static(b"ping"));
        let (text, from) = recv_text(&listener).await;
        assert_eq!(text, "ping");

        listener.send_to(b"pong", from).await.unwrap();
        let (data, source) = timeout(Duration::from_secs(2), received.recv()).await.unwrap().unwrap();
        assert_eq!(data, b"pong");
        assert_eq!(source, listener_addr);
    }

    #[tokio::test]
    async fn test_configured_remote_used_in_bound_mode() {
        let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = NetworkConfig {
            remote_address: Some("127.0.0.1".to_string()),
            remote_port: target.local_addr().unwrap().port(),
            ..loopback_listener()
        };

        let (handler, _received) = channel_handler();
        let mut session = DatagramSession::new(config, handler);
        session.start().await.unwrap();
        assert!(!session.is_associated());

        session.send(Bytes::from_static(b"explicit"));
        let (text, _) = recv_text(&target).await;
        assert_eq!(text, "explicit");
    }

    #[tokio::test]
    async fn test_restart_replaces_socket() {
        let (handler, _received) = channel_handler();
        let mut session = DatagramSession::new(loopback_listener(), handler);
        let sender = session.sender();

        session.start().await.unwrap();
        let first = session.local_addr().unwrap();
        session.start().await.unwrap();
        assert!(session.is_running());
        assert_ne!(session.local_addr().unwrap(), first);

        session.stop();
        sender.send(Bytes::from_static(b"after stop"));
        assert_eq!(session.stats().sends_dropped, 1);
    }

    #[tokio::test]
    async fn test_receive_error_is_retried() {
        // Reserve a port, then free it so nothing is listening there
        let closed = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let (handler, mut received) = channel_handler();
        let config = NetworkConfig {
            retry_delay_ms: 10,
            ..NetworkConfig::peer("127.0.0.1", closed_addr.port())
        };
        let mut session = DatagramSession::new(config, handler);
        session.start().await.unwrap();
        assert!(session.is_associated());
        let session_addr = SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            session.local_addr().unwrap().port(),
        );

        // The ICMP port-unreachable surfaces as a receive error
        session.send(Bytes::from_static(b"nobody home"));
        timeout(Duration::from_secs(2), async {
            while session.stats().receive_errors == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("no receive error reported");
        assert!(session.is_running());

        let peer = UdpSocket::bind(closed_addr).await.unwrap();
        peer.send_to(b"after", session_addr).await.unwrap();
        let (data, source) = timeout(Duration::from_secs(2), received.recv()).await.unwrap().unwrap();
        assert_eq!(data, b"after");
        assert_eq!(source, closed_addr);
        assert!(session.stats().receive_errors >= 1);
    }

    #[tokio::test]
    async fn test_unresolvable_remote_fails_unbound_start() {
        let (handler, _received) = channel_handler();
        let mut session = DatagramSession::new(NetworkConfig::peer("host.invalid", 5000), handler);

        assert!(matches!(session.start().await, Err(NetworkError::ResolveFailed(_))));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_start_failure_stays_stopped() {
        let (handler, _received) = channel_handler();
        let config = NetworkConfig {
            bind_address: "not an address".to_string(),
            ..NetworkConfig::listener(0)
        };
        let mut session = DatagramSession::new(config, handler);

        assert!(matches!(session.start().await, Err(NetworkError::BindFailed(_))));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.local_addr().is_none());
    }
}
