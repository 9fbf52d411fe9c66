//! Subscriber connector
//!
//! Wraps a [`Subscriber`] with a bounded retry loop and automatic
//! reconnect. The connector owns the subscriber handle and pushes work into
//! it; the subscriber signals back only through its cancellation flag, set
//! by user-initiated disconnects.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::warn;

use crate::subscriber::Subscriber;

type ErrorMessageCallback = Arc<dyn Fn(&str) + Send + Sync>;
type ReconnectCallback = Arc<dyn Fn(&Arc<Subscriber>) + Send + Sync>;

/// Retrying connection manager for one publisher endpoint.
pub struct SubscriberConnector {
    hostname: RwLock<String>,
    port: RwLock<u16>,
    /// -1 retries forever.
    max_retries: AtomicI32,
    /// Idle time between attempts, in milliseconds.
    retry_interval: AtomicU64,
    auto_reconnect: AtomicBool,
    cancel: AtomicBool,

    error_message: RwLock<Option<ErrorMessageCallback>>,
    reconnect: RwLock<Option<ReconnectCallback>>,
}

impl SubscriberConnector {
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            hostname: RwLock::new(hostname.to_string()),
            port: RwLock::new(port),
            max_retries: AtomicI32::new(-1),
            retry_interval: AtomicU64::new(2000),
            auto_reconnect: AtomicBool::new(true),
            cancel: AtomicBool::new(false),
            error_message: RwLock::new(None),
            reconnect: RwLock::new(None),
        }
    }

    /// Registers a callback fired each time a connection attempt fails.
    pub fn register_error_message_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.error_message.write() = Some(Arc::new(callback));
    }

    /// Registers a callback fired after an automatic reconnection attempt
    /// completes.
    pub fn register_reconnect_callback(
        &self,
        callback: impl Fn(&Arc<Subscriber>) + Send + Sync + 'static,
    ) {
        *self.reconnect.write() = Some(Arc::new(callback));
    }

    pub fn hostname(&self) -> String {
        self.hostname.read().clone()
    }

    pub fn set_hostname(&self, hostname: &str) {
        *self.hostname.write() = hostname.to_string();
    }

    pub fn port(&self) -> u16 {
        *self.port.read()
    }

    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries.load(Ordering::Acquire)
    }

    pub fn set_max_retries(&self, max_retries: i32) {
        self.max_retries.store(max_retries, Ordering::Release);
    }

    pub fn retry_interval(&self) -> u64 {
        self.retry_interval.load(Ordering::Acquire)
    }

    pub fn set_retry_interval(&self, milliseconds: u64) {
        self.retry_interval.store(milliseconds, Ordering::Release);
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::Acquire)
    }

    pub fn set_auto_reconnect(&self, auto_reconnect: bool) {
        self.auto_reconnect.store(auto_reconnect, Ordering::Release);
    }

    /// Cancels the current and all future connection sequences.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Runs the connection sequence: attempts `Subscriber::connect` up to
    /// `max_retries` times, sleeping `retry_interval` between failures.
    /// Returns whether the subscriber ended up connected.
    pub async fn connect(self: &Arc<Self>, subscriber: &Arc<Subscriber>) -> bool {
        if self.auto_reconnect.load(Ordering::Acquire) {
            let connector = Arc::clone(self);
            subscriber.register_auto_reconnect_callback(move |subscriber| {
                Self::auto_reconnect_dispatcher(Arc::clone(&connector), subscriber);
            });
        }

        self.cancel.store(false, Ordering::Release);
        subscriber.reset_cancellation();

        let hostname = self.hostname();
        let port = self.port();
        let max_retries = self.max_retries();
        let retry_interval = self.retry_interval();

        let mut attempt = 0;
        while !self.cancelled(subscriber) && (max_retries == -1 || attempt < max_retries) {
            match subscriber.connect(&hostname, port).await {
                Ok(()) => break,
                Err(e) => {
                    self.dispatch_error(format!(
                        "Failed to connect to \"{hostname}:{port}\": {e}"
                    ));
                    tokio::time::sleep(Duration::from_millis(retry_interval)).await;
                }
            }
            attempt += 1;
        }

        subscriber.is_connected()
    }

    fn cancelled(&self, subscriber: &Arc<Subscriber>) -> bool {
        self.cancel.load(Ordering::Acquire) || subscriber.cancellation_requested()
    }

    /// Invoked from the subscriber's disconnect path when the peer dropped
    /// the connection: notifies the user, re-runs the connection sequence,
    /// then fires the reconnect callback.
    fn auto_reconnect_dispatcher(connector: Arc<Self>, subscriber: Arc<Subscriber>) {
        tokio::spawn(async move {
            if connector.cancelled(&subscriber) {
                return;
            }

            connector
                .dispatch_error("Publisher connection terminated. Attempting to reconnect...".to_string());

            connector.connect(&subscriber).await;

            if !connector.cancel.load(Ordering::Acquire) {
                let callback = connector.reconnect.read().clone();
                if let Some(callback) = callback {
                    callback(&subscriber);
                }
            }
        });
    }

    /// Error notifications run off the connecting task.
    fn dispatch_error(&self, message: String) {
        warn!("{}", message);
        let callback = self.error_message.read().clone();
        if let Some(callback) = callback {
            tokio::spawn(async move {
                callback(&message);
            });
        }
    }
}
