//! GEP Core
//!
//! Core types, wire codecs, and protocol primitives for GEP, the Gateway
//! Exchange Protocol used to stream time-series measurements from a
//! publisher to subscribing clients.
//!
//! This crate provides:
//! - Protocol constants ([`ServerCommand`], [`ServerResponse`], operational modes)
//! - Payload-header framing for the command channel ([`frame`])
//! - The signal index cache ([`SignalIndexCache`])
//! - The stateless compact measurement decoder ([`CompactDecoder`])
//! - The stateful TSSC stream decoder ([`TsscDecoder`])

pub mod cache;
pub mod compact;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod tssc;
pub mod types;
pub mod wire;

pub use cache::SignalIndexCache;
pub use compact::CompactDecoder;
pub use error::{Error, Result};
pub use frame::{encode_command, encode_command_code, ResponseFrame};
pub use protocol::{ServerCommand, ServerResponse};
pub use tssc::{TsscDecoder, TsscSample};
pub use types::{BaseTimes, Measurement, MeasurementKey};
pub use wire::ByteReader;
