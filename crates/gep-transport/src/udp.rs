//! UDP data channel
//!
//! Optional datagram channel for hybrid deployments: the publisher streams
//! data packets to a local port while commands stay on TCP. Each datagram is
//! one complete response body; there is no outer framing.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};

use crate::error::{Result, TransportError};
use crate::event::ChannelEvent;

/// Largest UDP payload the channel will accept
const MAX_DATAGRAM_SIZE: usize = 65507;

const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// A bound UDP data channel.
pub struct DataChannel {
    socket: Arc<UdpSocket>,
    shutdown: Arc<Notify>,
}

impl DataChannel {
    /// Binds the local data port. The address family must match the resolved
    /// command-channel address so the publisher can reach it.
    pub async fn bind(ipv6: bool, port: u16) -> Result<Self> {
        let addr: SocketAddr = if ipv6 {
            (Ipv6Addr::UNSPECIFIED, port).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, port).into()
        };

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;
        debug!("data channel bound to {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// Starts the receive loop; each datagram arrives as one `Data` event.
    pub fn start_receiver(&self) -> mpsc::Receiver<ChannelEvent> {
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER_SIZE);
        let socket = Arc::clone(&self.socket);
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    result = socket.recv_from(&mut buf) => match result {
                        Ok((length, _)) => {
                            let data = Bytes::copy_from_slice(&buf[..length]);
                            if tx.send(ChannelEvent::Data(data)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("data channel receive error: {}", e);
                            let _ = tx.send(ChannelEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
            }
        });

        rx
    }

    /// Stops the receive loop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_receive() {
        let channel = DataChannel::bind(false, 0).await.unwrap();
        let addr = channel.local_addr().unwrap();
        let mut receiver = channel.start_receiver();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"datagram", addr).await.unwrap();

        match receiver.recv().await.unwrap() {
            ChannelEvent::Data(data) => assert_eq!(data.as_ref(), b"datagram"),
            other => panic!("expected Data event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_ends_receiver() {
        let channel = DataChannel::bind(false, 0).await.unwrap();
        let mut receiver = channel.start_receiver();

        channel.shutdown();

        // The receive loop exits and drops its sender
        assert!(receiver.recv().await.is_none());
    }
}
