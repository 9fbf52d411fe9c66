//! TCP command channel
//!
//! The command channel carries framed messages in both directions: an
//! 8-byte payload header (marker + little-endian size) followed by the body.
//! Reads are exact-length: header, then body, then dispatch. The read buffer
//! grows to the largest body seen and never shrinks.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use gep_core::frame::{self, PAYLOAD_HEADER_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::event::ChannelEvent;

/// Default channel buffer size for queued frames and events
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// Command channel configuration
#[derive(Debug, Clone)]
pub struct CommandChannelConfig {
    /// Keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
    /// Upper bound on a single frame body; larger sizes end the read loop
    pub max_frame_size: usize,
}

impl Default for CommandChannelConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

/// Write half of the command channel. Writes are fire-and-forget; delivery
/// is confirmed only by the next response the publisher sends.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Bytes>,
    shutdown: Arc<watch::Sender<bool>>,
    connected: Arc<AtomicBool>,
}

impl CommandSender {
    /// Queues an already-framed message for the socket.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::SendFailed("channel closed".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Stops both I/O loops; pending reads are abandoned.
    pub fn close(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);
    }
}

/// Read half of the command channel: a stream of [`ChannelEvent`]s.
pub type CommandReceiver = mpsc::Receiver<ChannelEvent>;

/// Resolves `host:port` and opens the command channel.
pub async fn connect(host: &str, port: u16) -> Result<(CommandSender, CommandReceiver, SocketAddr)> {
    connect_with_config(host, port, CommandChannelConfig::default()).await
}

pub async fn connect_with_config(
    host: &str,
    port: u16,
    config: CommandChannelConfig,
) -> Result<(CommandSender, CommandReceiver, SocketAddr)> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    let peer_addr = stream.peer_addr()?;

    if config.keepalive_secs > 0 {
        let socket = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(config.keepalive_secs));
        let _ = socket.set_tcp_keepalive(&keepalive);
    }

    let (reader, writer) = stream.into_split();
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
    let (incoming_tx, incoming_rx) = mpsc::channel::<ChannelEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let connected = Arc::new(AtomicBool::new(true));

    let sender = CommandSender {
        tx: outgoing_tx,
        shutdown: Arc::new(shutdown_tx),
        connected: Arc::clone(&connected),
    };

    tokio::spawn(run_write_loop(
        writer,
        outgoing_rx,
        shutdown_rx.clone(),
        Arc::clone(&connected),
    ));
    tokio::spawn(run_read_loop(
        reader,
        incoming_tx,
        shutdown_rx,
        connected,
        config.max_frame_size,
    ));

    info!("command channel connected to {}", peer_addr);
    Ok((sender, incoming_rx, peer_addr))
}

async fn run_write_loop(
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            frame = outgoing_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        error!("command channel write error: {}", e);
                        break;
                    }
                }
                None => break,
            }
        }
    }
    connected.store(false, Ordering::Release);
}

async fn run_read_loop(
    mut reader: OwnedReadHalf,
    incoming_tx: mpsc::Sender<ChannelEvent>,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    max_frame_size: usize,
) {
    let mut body = vec![0u8; frame::MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = read_frame(&mut reader, &mut body, max_frame_size) => match result {
                Ok(data) => {
                    if incoming_tx.send(ChannelEvent::Data(data)).await.is_err() {
                        break;
                    }
                }
                Err(ReadError::PeerClosed(reason)) => {
                    debug!("command channel closed by peer");
                    let _ = incoming_tx.send(ChannelEvent::Disconnected { reason }).await;
                    break;
                }
                Err(ReadError::TooLarge(size)) => {
                    let _ = incoming_tx
                        .send(ChannelEvent::Error(format!("frame too large: {size} bytes")))
                        .await;
                    break;
                }
                Err(ReadError::Io(e)) => {
                    error!("command channel read error: {}", e);
                    let _ = incoming_tx.send(ChannelEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    }
    connected.store(false, Ordering::Release);
}

enum ReadError {
    PeerClosed(Option<String>),
    TooLarge(usize),
    Io(io::Error),
}

fn classify(error: io::Error) -> ReadError {
    match error.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => ReadError::PeerClosed(Some(error.to_string())),
        _ => ReadError::Io(error),
    }
}

async fn read_frame(
    reader: &mut OwnedReadHalf,
    body: &mut Vec<u8>,
    max_frame_size: usize,
) -> std::result::Result<Bytes, ReadError> {
    let mut header = [0u8; PAYLOAD_HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(classify)?;

    let packet_size = frame::packet_size(&header) as usize;
    if packet_size > max_frame_size {
        return Err(ReadError::TooLarge(packet_size));
    }
    if packet_size > body.len() {
        body.resize(packet_size, 0);
    }

    reader
        .read_exact(&mut body[..packet_size])
        .await
        .map_err(classify)?;

    // Copy once so the read buffer is immediately reusable
    Ok(Bytes::copy_from_slice(&body[..packet_size]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gep_core::frame::encode_command_code;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_framed_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            // Receive the client's framed command
            let mut received = vec![0u8; 9];
            stream.read_exact(&mut received).await.unwrap();

            // Send a framed body back
            let body = [0x80u8, 0x02, 0, 0, 0, 2, b'o', b'k'];
            let mut response = Vec::new();
            response.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
            response.extend_from_slice(&(body.len() as u32).to_le_bytes());
            response.extend_from_slice(&body);
            stream.write_all(&response).await.unwrap();

            received
        });

        let (sender, mut receiver, peer) = connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(peer.port(), addr.port());

        sender.send(encode_command_code(0xCC, &[])).await.unwrap();

        let event = receiver.recv().await.unwrap();
        match event {
            ChannelEvent::Data(data) => {
                assert_eq!(data.len(), 8);
                assert_eq!(data[0], 0x80);
                assert_eq!(&data[6..], b"ok");
            }
            other => panic!("expected Data event, got {:?}", other),
        }

        let written = server.await.unwrap();
        assert_eq!(
            written,
            vec![0xAA, 0xBB, 0xCC, 0xDD, 0x01, 0x00, 0x00, 0x00, 0xCC]
        );

        sender.close();
    }

    #[tokio::test]
    async fn test_peer_close_maps_to_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let (_sender, mut receiver, _) = connect("127.0.0.1", addr.port()).await.unwrap();

        match receiver.recv().await.unwrap() {
            ChannelEvent::Disconnected { .. } => {}
            other => panic!("expected Disconnected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening
        let result = connect("127.0.0.1", 1).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
