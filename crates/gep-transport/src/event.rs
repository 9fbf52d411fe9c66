//! Channel event vocabulary

use bytes::Bytes;

/// Events a channel delivers to its consumer.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A complete message body (outer framing already stripped).
    Data(Bytes),
    /// The peer closed the connection (reset, abort, or clean EOF).
    Disconnected { reason: Option<String> },
    /// An I/O error other than a peer close; the channel's loop has ended.
    Error(String),
}
