//! GEP protocol constants
//!
//! Command and response codes, data-packet flags, and the operational-modes
//! bitfield negotiated once per connection. All values are fixed by the
//! protocol and must be preserved bit-exactly.

/// Commands a subscriber sends to the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerCommand {
    Authenticate = 0x00,
    MetadataRefresh = 0x01,
    Subscribe = 0x02,
    Unsubscribe = 0x03,
    RotateCipherKeys = 0x04,
    UpdateProcessingInterval = 0x05,
    DefineOperationalModes = 0x06,
    ConfirmNotification = 0x07,
    ConfirmBufferBlock = 0x08,
}

impl ServerCommand {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Responses a publisher sends to the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerResponse {
    Succeeded = 0x80,
    Failed = 0x81,
    DataPacket = 0x82,
    UpdateSignalIndexCache = 0x83,
    UpdateBaseTimes = 0x84,
    UpdateCipherKeys = 0x85,
    DataStartTime = 0x86,
    ProcessingComplete = 0x87,
    BufferBlock = 0x88,
    Notify = 0x89,
    ConfigurationChanged = 0x8A,
    NoOp = 0xFF,
}

impl ServerResponse {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x80 => Some(ServerResponse::Succeeded),
            0x81 => Some(ServerResponse::Failed),
            0x82 => Some(ServerResponse::DataPacket),
            0x83 => Some(ServerResponse::UpdateSignalIndexCache),
            0x84 => Some(ServerResponse::UpdateBaseTimes),
            0x85 => Some(ServerResponse::UpdateCipherKeys),
            0x86 => Some(ServerResponse::DataStartTime),
            0x87 => Some(ServerResponse::ProcessingComplete),
            0x88 => Some(ServerResponse::BufferBlock),
            0x89 => Some(ServerResponse::Notify),
            0x8A => Some(ServerResponse::ConfigurationChanged),
            0xFF => Some(ServerResponse::NoOp),
            _ => None,
        }
    }
}

/// Flags carried in the first byte of a data packet body.
pub mod data_packet_flags {
    pub const NO_FLAGS: u8 = 0x00;
    /// Frame-level timestamp follows; per-measurement times suppressed.
    pub const SYNCHRONIZED: u8 = 0x01;
    /// Measurements use the compact encoding.
    pub const COMPACT: u8 = 0x02;
    pub const CIPHER_INDEX: u8 = 0x04;
    /// Measurements use the TSSC encoding.
    pub const COMPRESSED: u8 = 0x08;
}

/// Operational-modes bitfield, negotiated via `DefineOperationalModes`.
pub mod operational_modes {
    pub const VERSION_MASK: u32 = 0x0000_001F;
    pub const COMPRESSION_MODE_MASK: u32 = 0x0000_00E0;
    pub const ENCODING_MASK: u32 = 0x0000_0300;
    pub const USE_COMMON_SERIALIZATION_FORMAT: u32 = 0x0100_0000;
    pub const RECEIVE_EXTERNAL_METADATA: u32 = 0x0200_0000;
    pub const RECEIVE_INTERNAL_METADATA: u32 = 0x0400_0000;
    pub const COMPRESS_PAYLOAD_DATA: u32 = 0x2000_0000;
    pub const COMPRESS_SIGNAL_INDEX_CACHE: u32 = 0x4000_0000;
    pub const COMPRESS_METADATA: u32 = 0x8000_0000;
    pub const NO_FLAGS: u32 = 0x0000_0000;
}

/// Character encoding selection within the operational modes.
pub mod operational_encoding {
    pub const UTF16_LE: u32 = 0x0000_0000;
    pub const UTF16_BE: u32 = 0x0000_0100;
    pub const UTF8: u32 = 0x0000_0200;
    pub const ANSI: u32 = 0x0000_0300;
}

/// Stream-compression selection within the operational modes.
pub mod compression_modes {
    pub const GZIP: u32 = 0x0000_0020;
    pub const TSSC: u32 = 0x0000_0040;
    pub const NONE: u32 = 0x0000_0000;
}
