//! GEP Transport Layer
//!
//! I/O channels for a GEP subscriber session:
//! - [`command`]: the framed TCP command channel every session requires
//! - [`udp`]: the optional datagram data channel for hybrid deployments
//!
//! Both channels deliver whole message bodies as [`ChannelEvent`]s through
//! bounded queues; the I/O loops run on spawned tasks and never call back
//! into the session layer.

pub mod command;
pub mod error;
pub mod event;
pub mod udp;

pub use command::{CommandChannelConfig, CommandReceiver, CommandSender};
pub use error::{Result, TransportError};
pub use event::ChannelEvent;
pub use udp::DataChannel;
