//! Reliable chat channel
//!
//! Plain UTF-8 text over a TCP stream: one message per write, no framing
//! beyond what the stream provides.

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::NetworkError;

const READ_BUFFER_SIZE: usize = 4096;

/// Accepts chat connections
pub struct ChatListener {
    listener: TcpListener,
}

impl ChatListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> Result<ChatConnection, NetworkError> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::info!("Chat connection from {}", peer);
        Ok(ChatConnection::from_stream(stream, peer))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.listener.local_addr()?)
    }
}

/// One end of a chat conversation
pub struct ChatConnection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: Vec<u8>,
    /// Bytes of a character split across reads
    pending: Vec<u8>,
}

impl ChatConnection {
    pub async fn connect(addr: SocketAddr) -> Result<Self, NetworkError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        Ok(Self::from_stream(stream, addr))
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to disable Nagle on chat socket: {}", e);
        }
        Self {
            stream,
            peer,
            buf: vec![0u8; READ_BUFFER_SIZE],
            pending: Vec::new(),
        }
    }

    /// Write one message
    pub async fn send(&mut self, text: &str) -> Result<(), NetworkError> {
        self.stream.write_all(text.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read whatever the peer sent next; `None` once the peer closed the stream.
    ///
    /// A multi-byte character cut by a read boundary is held back until the
    /// rest arrives. Invalid UTF-8 is replaced rather than rejected.
    pub async fn recv(&mut self) -> Result<Option<String>, NetworkError> {
        loop {
            let read = self.stream.read(&mut self.buf).await?;
            if read == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }

            self.pending.extend_from_slice(&self.buf[..read]);
            let complete = match std::str::from_utf8(&self.pending) {
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                _ => self.pending.len(),
            };
            if complete == 0 {
                continue;
            }

            let text: Vec<u8> = self.pending.drain(..complete).collect();
            return Ok(Some(String::from_utf8_lossy(&text).into_owned()));
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
