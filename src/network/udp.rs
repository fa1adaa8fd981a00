//! UDP socket construction

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use crate::config::NetworkConfig;

/// Create a non-blocking UDP socket bound to `addr` and register it with
/// the current tokio runtime.
///
/// Buffer sizes from `config` are best effort; the OS may clamp them.
pub fn create_socket(addr: SocketAddr, config: &NetworkConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_recv_buffer_size(config.recv_buffer_size) {
        tracing::warn!("Failed to set receive buffer size: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(config.send_buffer_size) {
        tracing::warn!("Failed to set send buffer size: {}", e);
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_socket_ephemeral() {
        let config = NetworkConfig::default();
        let socket = create_socket("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let config = NetworkConfig::default();
        let first = create_socket("127.0.0.1:0".parse().unwrap(), &config).unwrap();
        let taken = first.local_addr().unwrap();
        assert!(create_socket(taken, &config).is_err());
    }
}
