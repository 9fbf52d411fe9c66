//! Measurement data model

use uuid::Uuid;

use crate::error::Result;
use crate::wire::ByteReader;

/// 100-nanosecond ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Full identity of a measured signal.
///
/// A publisher references keys through per-subscription 16-bit runtime
/// indices; the index has no meaning across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementKey {
    /// Globally unique signal identifier.
    pub signal_id: Uuid,
    /// Source system the signal originates from.
    pub source: String,
    /// Numeric identifier within the source.
    pub id: u32,
}

/// A single decoded measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub signal_id: Uuid,
    pub source: String,
    pub id: u32,
    /// 100-nanosecond ticks since the protocol epoch.
    pub timestamp: i64,
    /// Measurement state flags.
    pub flags: u32,
    pub value: f32,
}

/// Rolling base-time anchors used by the compact decoder to reconstitute
/// truncated timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseTimes {
    pub offsets: [i64; 2],
    /// Which anchor the publisher currently considers active.
    pub time_index: usize,
}

impl BaseTimes {
    /// Decodes an `UpdateBaseTimes` payload: big-endian i32 time index
    /// followed by both i64 offsets.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(payload);
        let index = reader.read_i32_be()?;
        let offsets = [reader.read_i64_be()?, reader.read_i64_be()?];
        Ok(Self {
            offsets,
            time_index: usize::from(index == 1),
        })
    }
}
