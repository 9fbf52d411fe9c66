//! GEP Subscriber Client
//!
//! High-level async client for GEP, the Gateway Exchange Protocol. A
//! [`Subscriber`] holds one long-lived session with a publisher: it
//! negotiates operational modes, registers for a filtered measurement
//! stream, and delivers decoded measurements through callbacks on a
//! dedicated thread. A [`SubscriberConnector`] wraps the session with
//! bounded retry and automatic reconnect.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gep_client::{Subscriber, SubscriberConnector, SubscriptionInfo};
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = Subscriber::new();
//!
//!     subscriber.register_new_measurements_callback(|measurements| {
//!         for m in measurements {
//!             println!("{} {} = {}", m.timestamp, m.signal_id, m.value);
//!         }
//!     });
//!
//!     let connector = Arc::new(SubscriberConnector::new("localhost", 6165));
//!     if connector.connect(&subscriber).await {
//!         subscriber
//!             .subscribe_with(SubscriptionInfo {
//!                 filter_expression: "FILTER ActiveMeasurements WHERE SignalType = 'FREQ'".into(),
//!                 ..Default::default()
//!             })
//!             .await
//!             .expect("subscribe failed");
//!     }
//! }
//! ```

pub mod connector;
pub mod dispatch;
pub mod error;
pub mod subscriber;
pub mod subscription;

pub use connector::SubscriberConnector;
pub use error::{ClientError, Result};
pub use subscriber::Subscriber;
pub use subscription::SubscriptionInfo;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::connector::SubscriberConnector;
    pub use crate::error::{ClientError, Result};
    pub use crate::subscriber::Subscriber;
    pub use crate::subscription::SubscriptionInfo;
    pub use gep_core::{Measurement, MeasurementKey};
}
