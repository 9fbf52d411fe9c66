//! Callback dispatch
//!
//! All user-visible callbacks are funneled through one dedicated consumer
//! thread draining a bounded queue, so the I/O reactors are never blocked by
//! user code and callbacks on one subscriber are observed in total order.
//! Each [`Dispatch`] is a self-contained message owning its data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gep_core::Measurement;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

pub type MessageCallback = Box<dyn Fn(&str) + Send + Sync>;
pub type DataStartTimeCallback = Box<dyn Fn(i64) + Send + Sync>;
pub type MetadataCallback = Box<dyn Fn(&[u8]) + Send + Sync>;
pub type NewMeasurementsCallback = Box<dyn Fn(&[Measurement]) + Send + Sync>;
pub type SimpleCallback = Box<dyn Fn() + Send + Sync>;

/// Registered user callbacks.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub status_message: RwLock<Option<MessageCallback>>,
    pub error_message: RwLock<Option<MessageCallback>>,
    pub data_start_time: RwLock<Option<DataStartTimeCallback>>,
    pub metadata: RwLock<Option<MetadataCallback>>,
    pub new_measurements: RwLock<Option<NewMeasurementsCallback>>,
    pub processing_complete: RwLock<Option<MessageCallback>>,
    pub configuration_changed: RwLock<Option<SimpleCallback>>,
}

/// One queued callback invocation.
#[derive(Debug)]
pub(crate) enum Dispatch {
    StatusMessage(String),
    ErrorMessage(String),
    DataStartTime(i64),
    Metadata(Vec<u8>),
    NewMeasurements(Vec<Measurement>),
    ProcessingComplete(String),
    ConfigurationChanged,
    /// Sentinel queued by the disconnect path so the thread can be joined.
    Stop,
}

/// Consumer loop for the callback thread. Exits on [`Dispatch::Stop`] or
/// when `disconnecting` is observed; queued dispatches behind either are
/// discarded.
pub(crate) fn run_callback_thread(
    mut rx: mpsc::Receiver<Dispatch>,
    callbacks: Arc<Callbacks>,
    disconnecting: Arc<AtomicBool>,
) {
    while let Some(dispatch) = rx.blocking_recv() {
        if disconnecting.load(Ordering::Acquire) {
            break;
        }

        match dispatch {
            Dispatch::StatusMessage(message) => {
                if let Some(cb) = &*callbacks.status_message.read() {
                    cb(&message);
                }
            }
            Dispatch::ErrorMessage(message) => {
                if let Some(cb) = &*callbacks.error_message.read() {
                    cb(&message);
                }
            }
            Dispatch::DataStartTime(start_time) => {
                if let Some(cb) = &*callbacks.data_start_time.read() {
                    cb(start_time);
                }
            }
            Dispatch::Metadata(bytes) => {
                if let Some(cb) = &*callbacks.metadata.read() {
                    cb(&bytes);
                }
            }
            Dispatch::NewMeasurements(measurements) => {
                if let Some(cb) = &*callbacks.new_measurements.read() {
                    cb(&measurements);
                }
            }
            Dispatch::ProcessingComplete(message) => {
                if let Some(cb) = &*callbacks.processing_complete.read() {
                    cb(&message);
                }
            }
            Dispatch::ConfigurationChanged => {
                if let Some(cb) = &*callbacks.configuration_changed.read() {
                    cb();
                }
            }
            Dispatch::Stop => break,
        }
    }

    debug!("callback thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatches_run_in_order() {
        let callbacks = Arc::new(Callbacks::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = Arc::clone(&order);
        *callbacks.status_message.write() = Some(Box::new(move |m| {
            record.lock().push(format!("status:{m}"));
        }));
        let record = Arc::clone(&order);
        *callbacks.error_message.write() = Some(Box::new(move |m| {
            record.lock().push(format!("error:{m}"));
        }));
        let record = Arc::clone(&order);
        *callbacks.configuration_changed.write() = Some(Box::new(move || {
            record.lock().push("config".to_string());
        }));

        let (tx, rx) = mpsc::channel(16);
        tx.blocking_send(Dispatch::StatusMessage("a".into())).unwrap();
        tx.blocking_send(Dispatch::ErrorMessage("b".into())).unwrap();
        tx.blocking_send(Dispatch::ConfigurationChanged).unwrap();
        tx.blocking_send(Dispatch::Stop).unwrap();

        run_callback_thread(rx, callbacks, Arc::new(AtomicBool::new(false)));

        assert_eq!(
            *order.lock(),
            vec!["status:a".to_string(), "error:b".to_string(), "config".to_string()]
        );
    }

    #[test]
    fn test_stop_discards_queued_work() {
        let callbacks = Arc::new(Callbacks::default());
        let seen = Arc::new(Mutex::new(0));

        let count = Arc::clone(&seen);
        *callbacks.status_message.write() = Some(Box::new(move |_| {
            *count.lock() += 1;
        }));

        let (tx, rx) = mpsc::channel(16);
        tx.blocking_send(Dispatch::StatusMessage("first".into())).unwrap();
        tx.blocking_send(Dispatch::Stop).unwrap();
        tx.blocking_send(Dispatch::StatusMessage("after stop".into())).unwrap();
        drop(tx);

        run_callback_thread(rx, callbacks, Arc::new(AtomicBool::new(false)));

        assert_eq!(*seen.lock(), 1);
    }
}
