//! GEP subscriber session
//!
//! One [`Subscriber`] owns one session with a publisher: the TCP command
//! channel, the optional UDP data channel, the signal index cache, both
//! measurement decoders, and the callback thread. Response routing runs on
//! spawned router tasks fed by the transport; decoded results are handed to
//! the callback thread as owned messages.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use gep_core::cache::{decompress_gzip, SignalIndexCache};
use gep_core::compact::CompactDecoder;
use gep_core::frame::{self, ResponseFrame, PAYLOAD_HEADER_SIZE};
use gep_core::protocol::{
    compression_modes, data_packet_flags, operational_encoding, operational_modes, ServerCommand,
    ServerResponse,
};
use gep_core::tssc::{TsscDecoder, TSSC_VERSION};
use gep_core::types::{BaseTimes, Measurement};
use gep_core::wire::ByteReader;
use gep_transport::{ChannelEvent, CommandReceiver, CommandSender, DataChannel};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::{
    run_callback_thread, Callbacks, DataStartTimeCallback, Dispatch, MessageCallback,
    MetadataCallback, NewMeasurementsCallback, SimpleCallback,
};
use crate::error::{ClientError, Result};
use crate::subscription::SubscriptionInfo;

pub type AutoReconnectCallback = Box<dyn Fn(Arc<Subscriber>) + Send + Sync>;

const CALLBACK_QUEUE_DEPTH: usize = 512;

/// Sequenced TSSC decode state for the active subscription.
struct TsscStream {
    decoder: TsscDecoder,
    sequence_number: u16,
    /// One-shot: armed before every (re)subscription, cleared by the first
    /// reset it causes.
    reset_requested: bool,
}

/// Messages produced while a decoder lock is held, delivered afterwards.
enum Notice {
    Status(String),
    Error(String),
}

/// A GEP subscriber session.
pub struct Subscriber {
    compress_payload_data: AtomicBool,
    compress_metadata: AtomicBool,
    compress_signal_index_cache: AtomicBool,

    connected: AtomicBool,
    subscribed: AtomicBool,
    disconnecting: Arc<AtomicBool>,
    /// Set by user-initiated disconnect; observed by the connector instead
    /// of the subscriber reaching back into it.
    cancellation: AtomicBool,

    subscription: RwLock<SubscriptionInfo>,
    host_address: RwLock<Option<SocketAddr>>,

    command: RwLock<Option<CommandSender>>,
    data_channel: RwLock<Option<DataChannel>>,

    callbacks: Arc<Callbacks>,
    connection_terminated: RwLock<Option<SimpleCallback>>,
    auto_reconnect: RwLock<Option<AutoReconnectCallback>>,

    dispatch_tx: RwLock<Option<mpsc::Sender<Dispatch>>>,
    callback_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    command_router: Mutex<Option<tokio::task::JoinHandle<()>>>,
    data_router: Mutex<Option<tokio::task::JoinHandle<()>>>,

    signal_index_cache: RwLock<SignalIndexCache>,
    base_times: RwLock<BaseTimes>,
    tssc: Mutex<TsscStream>,

    total_command_channel_bytes: AtomicU64,
    total_data_channel_bytes: AtomicU64,
    total_measurements: AtomicU64,
}

impl Subscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            compress_payload_data: AtomicBool::new(true),
            compress_metadata: AtomicBool::new(true),
            compress_signal_index_cache: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
            disconnecting: Arc::new(AtomicBool::new(false)),
            cancellation: AtomicBool::new(false),
            subscription: RwLock::new(SubscriptionInfo::default()),
            host_address: RwLock::new(None),
            command: RwLock::new(None),
            data_channel: RwLock::new(None),
            callbacks: Arc::new(Callbacks::default()),
            connection_terminated: RwLock::new(None),
            auto_reconnect: RwLock::new(None),
            dispatch_tx: RwLock::new(None),
            callback_thread: Mutex::new(None),
            command_router: Mutex::new(None),
            data_router: Mutex::new(None),
            signal_index_cache: RwLock::new(SignalIndexCache::new()),
            base_times: RwLock::new(BaseTimes::default()),
            tssc: Mutex::new(TsscStream {
                decoder: TsscDecoder::new(),
                sequence_number: 0,
                reset_requested: false,
            }),
            total_command_channel_bytes: AtomicU64::new(0),
            total_data_channel_bytes: AtomicU64::new(0),
            total_measurements: AtomicU64::new(0),
        })
    }

    // --- callback registration ---

    pub fn register_status_message_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.callbacks.status_message.write() = Some(Box::new(callback) as MessageCallback);
    }

    pub fn register_error_message_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.callbacks.error_message.write() = Some(Box::new(callback) as MessageCallback);
    }

    pub fn register_data_start_time_callback(&self, callback: impl Fn(i64) + Send + Sync + 'static) {
        *self.callbacks.data_start_time.write() = Some(Box::new(callback) as DataStartTimeCallback);
    }

    pub fn register_metadata_callback(&self, callback: impl Fn(&[u8]) + Send + Sync + 'static) {
        *self.callbacks.metadata.write() = Some(Box::new(callback) as MetadataCallback);
    }

    pub fn register_new_measurements_callback(
        &self,
        callback: impl Fn(&[Measurement]) + Send + Sync + 'static,
    ) {
        *self.callbacks.new_measurements.write() =
            Some(Box::new(callback) as NewMeasurementsCallback);
    }

    pub fn register_processing_complete_callback(
        &self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) {
        *self.callbacks.processing_complete.write() = Some(Box::new(callback) as MessageCallback);
    }

    pub fn register_configuration_changed_callback(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) {
        *self.callbacks.configuration_changed.write() = Some(Box::new(callback) as SimpleCallback);
    }

    pub fn register_connection_terminated_callback(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) {
        *self.connection_terminated.write() = Some(Box::new(callback) as SimpleCallback);
    }

    pub fn register_auto_reconnect_callback(
        &self,
        callback: impl Fn(Arc<Subscriber>) + Send + Sync + 'static,
    ) {
        *self.auto_reconnect.write() = Some(Box::new(callback) as AutoReconnectCallback);
    }

    // --- configuration ---

    pub fn subscription_info(&self) -> SubscriptionInfo {
        self.subscription.read().clone()
    }

    pub fn set_subscription_info(&self, info: SubscriptionInfo) {
        *self.subscription.write() = info;
    }

    pub fn is_payload_data_compressed(&self) -> bool {
        self.compress_payload_data.load(Ordering::Acquire)
    }

    /// Effective at the next connect; the payload encoding cannot change
    /// mid-session.
    pub fn set_payload_data_compressed(&self, compressed: bool) {
        self.compress_payload_data.store(compressed, Ordering::Release);
    }

    pub fn is_metadata_compressed(&self) -> bool {
        self.compress_metadata.load(Ordering::Acquire)
    }

    pub async fn set_metadata_compressed(&self, compressed: bool) -> Result<()> {
        self.compress_metadata.store(compressed, Ordering::Release);
        if self.connected.load(Ordering::Acquire) {
            self.send_operational_modes().await?;
        }
        Ok(())
    }

    pub fn is_signal_index_cache_compressed(&self) -> bool {
        self.compress_signal_index_cache.load(Ordering::Acquire)
    }

    pub async fn set_signal_index_cache_compressed(&self, compressed: bool) -> Result<()> {
        self.compress_signal_index_cache.store(compressed, Ordering::Release);
        if self.connected.load(Ordering::Acquire) {
            self.send_operational_modes().await?;
        }
        Ok(())
    }

    // --- state and statistics ---

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// True once a user-initiated disconnect has requested that connection
    /// sequences stop.
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation.load(Ordering::Acquire)
    }

    pub(crate) fn reset_cancellation(&self) {
        self.cancellation.store(false, Ordering::Release);
    }

    /// Bytes received on the command channel since the last connect,
    /// including payload headers.
    pub fn total_command_channel_bytes_received(&self) -> u64 {
        self.total_command_channel_bytes.load(Ordering::Relaxed)
    }

    /// Bytes received on the data channel since the last connect. Without a
    /// UDP data channel, data arrives on the command channel and that
    /// counter is reported instead.
    pub fn total_data_channel_bytes_received(&self) -> u64 {
        if self.subscription.read().udp_data_channel {
            self.total_data_channel_bytes.load(Ordering::Relaxed)
        } else {
            self.total_command_channel_bytes.load(Ordering::Relaxed)
        }
    }

    /// Measurements received since the last subscribe.
    pub fn total_measurements_received(&self) -> u64 {
        self.total_measurements.load(Ordering::Relaxed)
    }

    // --- lifecycle ---

    /// Connects to the publisher, starts the session workers, and sends the
    /// operational modes.
    pub async fn connect(self: &Arc<Self>, hostname: &str, port: u16) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Err(ClientError::AlreadyConnected);
        }

        self.total_command_channel_bytes.store(0, Ordering::Relaxed);
        self.total_data_channel_bytes.store(0, Ordering::Relaxed);
        self.total_measurements.store(0, Ordering::Relaxed);
        self.disconnecting.store(false, Ordering::Release);

        let (sender, receiver, peer_addr) = gep_transport::command::connect(hostname, port).await?;
        info!("connected to publisher at {}", peer_addr);

        *self.host_address.write() = Some(peer_addr);
        *self.command.write() = Some(sender);

        let (dispatch_tx, dispatch_rx) = mpsc::channel(CALLBACK_QUEUE_DEPTH);
        *self.dispatch_tx.write() = Some(dispatch_tx);

        let callbacks = Arc::clone(&self.callbacks);
        let disconnecting = Arc::clone(&self.disconnecting);
        let thread = std::thread::Builder::new()
            .name("gep-callbacks".to_string())
            .spawn(move || run_callback_thread(dispatch_rx, callbacks, disconnecting))
            .map_err(|e| ClientError::Transport(gep_transport::TransportError::Io(e)))?;
        *self.callback_thread.lock() = Some(thread);

        let subscriber = Arc::clone(self);
        *self.command_router.lock() = Some(tokio::spawn(async move {
            subscriber.run_command_router(receiver).await;
        }));

        self.send_operational_modes().await?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Subscribes with the given configuration.
    pub async fn subscribe_with(self: &Arc<Self>, info: SubscriptionInfo) -> Result<()> {
        self.set_subscription_info(info);
        self.subscribe().await
    }

    /// Subscribes using the current [`SubscriptionInfo`]. An existing
    /// subscription is unsubscribed first. The `subscribed` flag flips when
    /// the publisher acknowledges with `Succeeded`.
    pub async fn subscribe(self: &Arc<Self>) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ClientError::NotConnected);
        }
        if self.subscribed.load(Ordering::Acquire) {
            self.unsubscribe().await?;
        }

        self.total_measurements.store(0, Ordering::Relaxed);

        let info = self.subscription.read().clone();
        let connection_string = info.to_connection_string();

        if info.udp_data_channel {
            let ipv6 = matches!(*self.host_address.read(), Some(addr) if addr.is_ipv6());
            let channel = DataChannel::bind(ipv6, info.data_channel_local_port)
                .await
                .map_err(|e| ClientError::DataChannelBind(e.to_string()))?;
            let receiver = channel.start_receiver();
            *self.data_channel.write() = Some(channel);

            let subscriber = Arc::clone(self);
            *self.data_router.lock() = Some(tokio::spawn(async move {
                subscriber.run_data_router(receiver).await;
            }));
        }

        let mut payload = BytesMut::with_capacity(5 + connection_string.len());
        let flags = data_packet_flags::COMPACT
            | if info.remotely_synchronized {
                data_packet_flags::SYNCHRONIZED
            } else {
                data_packet_flags::NO_FLAGS
            };
        payload.put_u8(flags);
        payload.put_u32(connection_string.len() as u32);
        payload.put_slice(connection_string.as_bytes());

        self.send_server_command_with(ServerCommand::Subscribe, &payload)
            .await?;

        // Whatever TSSC state the previous subscription built is now stale
        self.tssc.lock().reset_requested = true;
        Ok(())
    }

    /// Stops the data channel and asks the publisher to unsubscribe. The
    /// `subscribed` flag flips on the publisher's `Succeeded` response.
    pub async fn unsubscribe(&self) -> Result<()> {
        self.shutdown_data_channel().await;
        self.send_server_command(ServerCommand::Unsubscribe).await
    }

    /// Disconnects from the publisher. Safe to call repeatedly; only the
    /// first call tears the session down.
    pub async fn disconnect(self: &Arc<Self>) {
        self.disconnect_with(false).await;
    }

    pub(crate) async fn disconnect_with(self: &Arc<Self>, auto_reconnect: bool) {
        if self.disconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        // A user-initiated disconnect cancels any connection sequence in
        // flight, whether or not a session was up
        if !auto_reconnect {
            self.cancellation.store(true, Ordering::Release);
        }

        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        self.subscribed.store(false, Ordering::Release);

        if !was_connected {
            self.disconnecting.store(false, Ordering::Release);
            return;
        }

        // Release the callback queue and close both channels so every
        // worker can wind down
        let dispatch_tx = self.dispatch_tx.write().take();
        if let Some(tx) = dispatch_tx {
            let _ = tx.send(Dispatch::Stop).await;
        }
        if let Some(sender) = self.command.write().take() {
            sender.close();
        }
        self.shutdown_data_channel().await;

        let router = self.command_router.lock().take();
        if let Some(task) = router {
            let _ = task.await;
        }
        let thread = self.callback_thread.lock().take();
        if let Some(handle) = thread {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        if let Some(callback) = &*self.connection_terminated.read() {
            callback();
        }

        if auto_reconnect {
            if let Some(callback) = &*self.auto_reconnect.read() {
                callback(Arc::clone(self));
            }
        }

        self.disconnecting.store(false, Ordering::Release);
    }

    async fn shutdown_data_channel(&self) {
        let channel = self.data_channel.write().take();
        if let Some(channel) = channel {
            channel.shutdown();
        }
        let router = self.data_router.lock().take();
        if let Some(task) = router {
            let _ = task.await;
        }
    }

    // --- commands ---

    pub async fn send_server_command(&self, command: ServerCommand) -> Result<()> {
        self.send_command_frame(frame::encode_command(command, &[])).await
    }

    pub async fn send_server_command_with(
        &self,
        command: ServerCommand,
        payload: &[u8],
    ) -> Result<()> {
        self.send_command_frame(frame::encode_command(command, payload)).await
    }

    /// Sends a command whose payload is a length-prefixed UTF-8 message.
    pub async fn send_server_command_message(
        &self,
        command: ServerCommand,
        message: &str,
    ) -> Result<()> {
        let mut payload = BytesMut::with_capacity(4 + message.len());
        payload.put_u32(message.len() as u32);
        payload.put_slice(message.as_bytes());
        self.send_command_frame(frame::encode_command(command, &payload)).await
    }

    /// Escape hatch for command codes outside [`ServerCommand`].
    pub async fn send_raw_command(&self, code: u8, payload: &[u8]) -> Result<()> {
        self.send_command_frame(frame::encode_command_code(code, payload)).await
    }

    /// Requests a fresh metadata image from the publisher.
    pub async fn request_metadata(&self) -> Result<()> {
        self.send_server_command(ServerCommand::MetadataRefresh).await
    }

    async fn send_command_frame(&self, framed: Bytes) -> Result<()> {
        let sender = self.command.read().clone();
        match sender {
            Some(sender) => Ok(sender.send(framed).await?),
            None => Err(ClientError::NotConnected),
        }
    }

    pub(crate) async fn send_operational_modes(&self) -> Result<()> {
        let udp_data_channel = self.subscription.read().udp_data_channel;

        let mut modes = compression_modes::GZIP
            | operational_encoding::UTF8
            | operational_modes::USE_COMMON_SERIALIZATION_FORMAT;

        // TSSC needs the stateful TCP stream; a datagram channel gets the
        // stateless compact encoding
        if self.compress_payload_data.load(Ordering::Acquire) && !udp_data_channel {
            modes |= operational_modes::COMPRESS_PAYLOAD_DATA | compression_modes::TSSC;
        }
        if self.compress_metadata.load(Ordering::Acquire) {
            modes |= operational_modes::COMPRESS_METADATA;
        }
        if self.compress_signal_index_cache.load(Ordering::Acquire) {
            modes |= operational_modes::COMPRESS_SIGNAL_INDEX_CACHE;
        }

        self.send_server_command_with(ServerCommand::DefineOperationalModes, &modes.to_be_bytes())
            .await
    }

    // --- response routing ---

    async fn run_command_router(self: Arc<Self>, mut receiver: CommandReceiver) {
        while let Some(event) = receiver.recv().await {
            if self.disconnecting.load(Ordering::Acquire) {
                break;
            }
            match event {
                ChannelEvent::Data(body) => {
                    self.total_command_channel_bytes
                        .fetch_add((PAYLOAD_HEADER_SIZE + body.len()) as u64, Ordering::Relaxed);
                    self.process_server_response(&body).await;
                }
                ChannelEvent::Disconnected { .. } => {
                    // Tear down on a fresh task so this router can be joined
                    let subscriber = Arc::clone(&self);
                    tokio::spawn(async move {
                        subscriber.disconnect_with(true).await;
                    });
                    break;
                }
                ChannelEvent::Error(e) => {
                    self.dispatch_error(format!("Error reading data from command channel: {e}"))
                        .await;
                    break;
                }
            }
        }
    }

    async fn run_data_router(self: Arc<Self>, mut receiver: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = receiver.recv().await {
            if self.disconnecting.load(Ordering::Acquire) {
                break;
            }
            match event {
                ChannelEvent::Data(body) => {
                    self.total_data_channel_bytes
                        .fetch_add(body.len() as u64, Ordering::Relaxed);
                    self.process_server_response(&body).await;
                }
                ChannelEvent::Disconnected { .. } => break,
                ChannelEvent::Error(e) => {
                    self.dispatch_error(format!("Error reading data from data channel: {e}"))
                        .await;
                    break;
                }
            }
        }
    }

    async fn process_server_response(&self, body: &Bytes) {
        let frame = match ResponseFrame::decode(body) {
            Ok(frame) => frame,
            Err(e) => {
                self.dispatch_error(format!("Error parsing server response: {e}")).await;
                return;
            }
        };

        match ServerResponse::from_u8(frame.response_code) {
            Some(ServerResponse::Succeeded) => {
                self.handle_succeeded(frame.command_code, frame.payload).await;
            }
            Some(ServerResponse::Failed) => {
                self.handle_failed(frame.command_code, frame.payload).await;
            }
            Some(ServerResponse::DataPacket) => {
                self.handle_data_packet(frame.payload).await;
            }
            Some(ServerResponse::DataStartTime) => {
                self.handle_data_start_time(frame.payload).await;
            }
            Some(ServerResponse::ProcessingComplete) => {
                let message = String::from_utf8_lossy(frame.payload).into_owned();
                self.dispatch(Dispatch::ProcessingComplete(message)).await;
            }
            Some(ServerResponse::UpdateSignalIndexCache) => {
                self.handle_update_signal_index_cache(frame.payload).await;
            }
            Some(ServerResponse::UpdateBaseTimes) => {
                self.handle_update_base_times(frame.payload).await;
            }
            Some(ServerResponse::ConfigurationChanged) => {
                self.dispatch(Dispatch::ConfigurationChanged).await;
            }
            Some(ServerResponse::NoOp) => {}
            _ => {
                self.dispatch_error(format!(
                    "Encountered unexpected server response code: 0x{:02x}",
                    frame.response_code
                ))
                .await;
            }
        }
    }

    async fn handle_succeeded(&self, command_code: u8, payload: &[u8]) {
        const SUBSCRIBE: u8 = ServerCommand::Subscribe as u8;
        const UNSUBSCRIBE: u8 = ServerCommand::Unsubscribe as u8;
        const METADATA_REFRESH: u8 = ServerCommand::MetadataRefresh as u8;
        const AUTHENTICATE: u8 = ServerCommand::Authenticate as u8;
        const ROTATE_CIPHER_KEYS: u8 = ServerCommand::RotateCipherKeys as u8;

        match command_code {
            // A successful refresh carries the metadata image itself
            METADATA_REFRESH => {
                self.dispatch(Dispatch::Metadata(payload.to_vec())).await;
            }
            SUBSCRIBE | UNSUBSCRIBE => {
                self.subscribed
                    .store(command_code == SUBSCRIBE, Ordering::Release);
                self.dispatch_status(format!(
                    "Received success code in response to server command 0x{command_code:02x}: {}",
                    String::from_utf8_lossy(payload)
                ))
                .await;
            }
            AUTHENTICATE | ROTATE_CIPHER_KEYS => {
                self.dispatch_status(format!(
                    "Received success code in response to server command 0x{command_code:02x}: {}",
                    String::from_utf8_lossy(payload)
                ))
                .await;
            }
            _ => {
                // Without knowing the command we cannot interpret the data
                self.dispatch_error(format!(
                    "Received success code in response to unknown server command 0x{command_code:02x}"
                ))
                .await;
            }
        }
    }

    async fn handle_failed(&self, command_code: u8, payload: &[u8]) {
        self.dispatch_error(format!(
            "Received failure code from server command 0x{command_code:02x}: {}",
            String::from_utf8_lossy(payload)
        ))
        .await;
    }

    async fn handle_data_packet(&self, payload: &[u8]) {
        let (include_time, millisecond_resolution) = {
            let info = self.subscription.read();
            (info.include_time, info.use_millisecond_resolution)
        };

        let mut reader = ByteReader::new(payload);
        let header = (|| -> gep_core::Result<(u8, Option<i64>, u32)> {
            let flags = reader.read_u8()?;
            let frame_timestamp = if flags & data_packet_flags::SYNCHRONIZED != 0 {
                Some(reader.read_i64_be()?)
            } else {
                None
            };
            let count = reader.read_u32_be()?;
            Ok((flags, frame_timestamp, count))
        })();

        let (flags, frame_timestamp, count) = match header {
            Ok(header) => header,
            Err(e) => {
                self.dispatch_error(format!("Error parsing data packet: {e}")).await;
                return;
            }
        };

        self.total_measurements
            .fetch_add(u64::from(count), Ordering::Relaxed);

        let mut measurements = Vec::new();
        let mut notices = Vec::new();

        if flags & data_packet_flags::COMPRESSED != 0 {
            self.decode_tssc(reader.rest(), &mut measurements, &mut notices);
        } else {
            let include_time = include_time && frame_timestamp.is_none();
            let decode_result = {
                let cache = self.signal_index_cache.read();
                let decoder = CompactDecoder::new(
                    &cache,
                    *self.base_times.read(),
                    include_time,
                    millisecond_resolution,
                );
                decoder.decode_all(&mut reader, frame_timestamp, &mut measurements)
            };
            if decode_result.is_err() {
                notices.push(Notice::Error("Error parsing measurement".to_string()));
            }
        }

        for notice in notices {
            match notice {
                Notice::Status(message) => self.dispatch_status(message).await,
                Notice::Error(message) => self.dispatch_error(message).await,
            }
        }

        self.dispatch(Dispatch::NewMeasurements(measurements)).await;
    }

    /// TSSC decode path: version byte, sequence number, then the compressed
    /// body. Runs entirely under the decoder lock; produced notices are
    /// dispatched by the caller.
    fn decode_tssc(
        &self,
        payload: &[u8],
        measurements: &mut Vec<Measurement>,
        notices: &mut Vec<Notice>,
    ) {
        let mut reader = ByteReader::new(payload);

        let (version, sequence) = match (|| -> gep_core::Result<(u8, u16)> {
            Ok((reader.read_u8()?, reader.read_u16_be()?))
        })() {
            Ok(header) => header,
            Err(e) => {
                notices.push(Notice::Error(format!("Error parsing TSSC packet: {e}")));
                return;
            }
        };

        if version != TSSC_VERSION {
            notices.push(Notice::Error(format!(
                "TSSC version not recognized: 0x{version:02x}"
            )));
            return;
        }

        let mut stream = self.tssc.lock();

        if (sequence == 0 && stream.sequence_number > 0) || stream.reset_requested {
            if !stream.reset_requested {
                // A spontaneous publisher restart; our own rearm is silent
                notices.push(Notice::Status(format!(
                    "TSSC algorithm reset before sequence number: {}",
                    stream.sequence_number
                )));
            }
            stream.decoder.reset();
            stream.sequence_number = 0;
            stream.reset_requested = false;
        }

        if stream.sequence_number != sequence {
            notices.push(Notice::Error(format!(
                "TSSC is out of sequence. Expecting: {}, Received: {}",
                stream.sequence_number, sequence
            )));
            // Decoding would diverge; wait for the stream to come back
            return;
        }

        stream.decoder.set_buffer(reader.rest());

        let decode_result = (|| -> gep_core::Result<()> {
            let cache = self.signal_index_cache.read();
            while let Some(sample) = stream.decoder.try_get_measurement()? {
                if let Some(key) = cache.get(sample.runtime_index) {
                    measurements.push(Measurement {
                        signal_id: key.signal_id,
                        source: key.source.clone(),
                        id: key.id,
                        timestamp: sample.timestamp,
                        flags: sample.quality,
                        value: sample.value,
                    });
                }
            }
            Ok(())
        })();

        if let Err(e) = decode_result {
            notices.push(Notice::Error(format!("Decompression failure: {e}")));
        }

        // The counter advances even after a decode failure so one corrupt
        // packet cannot stall the stream; rollover skips the reserved
        // fresh-start value
        stream.sequence_number = stream.sequence_number.wrapping_add(1);
        if stream.sequence_number == 0 {
            stream.sequence_number = 1;
        }
    }

    async fn handle_data_start_time(&self, payload: &[u8]) {
        match ByteReader::new(payload).read_i64_be() {
            Ok(start_time) => self.dispatch(Dispatch::DataStartTime(start_time)).await,
            Err(e) => {
                self.dispatch_error(format!("Error parsing data start time: {e}")).await;
            }
        }
    }

    async fn handle_update_signal_index_cache(&self, payload: &[u8]) {
        let result = (|| -> gep_core::Result<()> {
            let image;
            let bytes = if self.compress_signal_index_cache.load(Ordering::Acquire) {
                image = decompress_gzip(payload)?;
                &image[..]
            } else {
                payload
            };
            self.signal_index_cache.write().rebuild_from(bytes)
        })();

        if let Err(e) = result {
            self.dispatch_error(format!("Error parsing signal index cache: {e}")).await;
        }
    }

    async fn handle_update_base_times(&self, payload: &[u8]) {
        match BaseTimes::decode(payload) {
            Ok(base_times) => {
                debug!(
                    time_index = base_times.time_index,
                    "base time offsets updated"
                );
                *self.base_times.write() = base_times;
            }
            Err(e) => {
                self.dispatch_error(format!("Error parsing base time offsets: {e}")).await;
            }
        }
    }

    // --- dispatch helpers ---

    async fn dispatch(&self, dispatch: Dispatch) {
        let tx = self.dispatch_tx.read().clone();
        if let Some(tx) = tx {
            let _ = tx.send(dispatch).await;
        }
    }

    async fn dispatch_status(&self, message: String) {
        self.dispatch(Dispatch::StatusMessage(message)).await;
    }

    async fn dispatch_error(&self, message: String) {
        warn!("{}", message);
        self.dispatch(Dispatch::ErrorMessage(message)).await;
    }
}
