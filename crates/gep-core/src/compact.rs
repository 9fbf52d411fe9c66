//! Compact measurement decoder
//!
//! Stateless per-packet parser for the compact encoding: a flag byte, the
//! 16-bit runtime index, an optional timestamp, and the big-endian float
//! value. Timestamps are either a full 8-byte tick count or a truncated
//! offset against one of the two base-time anchors, in tick or millisecond
//! resolution.

use crate::cache::SignalIndexCache;
use crate::error::Result;
use crate::types::{BaseTimes, Measurement, TICKS_PER_MILLISECOND};
use crate::wire::ByteReader;

/// Flags carried in the leading byte of each compact measurement.
pub mod compact_flags {
    pub const DATA_RANGE: u8 = 0x01;
    pub const DATA_QUALITY: u8 = 0x02;
    pub const TIME_QUALITY: u8 = 0x04;
    pub const SYSTEM_ISSUE: u8 = 0x08;
    pub const CALCULATED_VALUE: u8 = 0x10;
    pub const DISCARDED_VALUE: u8 = 0x20;
    /// Timestamp is an offset against a base-time anchor.
    pub const BASE_TIME_OFFSET: u8 = 0x40;
    /// Which base-time anchor the offset applies to.
    pub const TIME_INDEX: u8 = 0x80;
}

mod state_flags {
    pub const DATA_RANGE_MASK: u32 = 0x0000_00FC;
    pub const DATA_QUALITY_MASK: u32 = 0x0000_EF03;
    pub const TIME_QUALITY_MASK: u32 = 0x00BF_0000;
    pub const SYSTEM_ISSUE_MASK: u32 = 0xE000_0000;
    pub const CALCULATED_VALUE_MASK: u32 = 0x0000_1000;
    pub const DISCARDED_VALUE_MASK: u32 = 0x0040_0000;
}

/// Expands the compact flag byte into the full 32-bit measurement flags.
pub fn map_to_full_flags(compact: u8) -> u32 {
    let mut flags = 0;

    if compact & compact_flags::DATA_RANGE != 0 {
        flags |= state_flags::DATA_RANGE_MASK;
    }
    if compact & compact_flags::DATA_QUALITY != 0 {
        flags |= state_flags::DATA_QUALITY_MASK;
    }
    if compact & compact_flags::TIME_QUALITY != 0 {
        flags |= state_flags::TIME_QUALITY_MASK;
    }
    if compact & compact_flags::SYSTEM_ISSUE != 0 {
        flags |= state_flags::SYSTEM_ISSUE_MASK;
    }
    if compact & compact_flags::CALCULATED_VALUE != 0 {
        flags |= state_flags::CALCULATED_VALUE_MASK;
    }
    if compact & compact_flags::DISCARDED_VALUE != 0 {
        flags |= state_flags::DISCARDED_VALUE_MASK;
    }

    flags
}

/// Decoder for one data packet's worth of compact measurements.
pub struct CompactDecoder<'a> {
    cache: &'a SignalIndexCache,
    base_times: BaseTimes,
    include_time: bool,
    millisecond_resolution: bool,
}

impl<'a> CompactDecoder<'a> {
    pub fn new(
        cache: &'a SignalIndexCache,
        base_times: BaseTimes,
        include_time: bool,
        millisecond_resolution: bool,
    ) -> Self {
        Self {
            cache,
            base_times,
            include_time,
            millisecond_resolution,
        }
    }

    /// Decodes every measurement remaining in `reader`, appending to `out`.
    ///
    /// Measurements whose runtime index is absent from the cache are dropped
    /// without an error. A frame-level timestamp, when supplied, overrides
    /// each measurement's own time. Truncated input returns an error with
    /// the measurements decoded so far already in `out`.
    pub fn decode_all(
        &self,
        reader: &mut ByteReader,
        frame_timestamp: Option<i64>,
        out: &mut Vec<Measurement>,
    ) -> Result<()> {
        while !reader.is_empty() {
            self.decode_one(reader, frame_timestamp, out)?;
        }
        Ok(())
    }

    fn decode_one(
        &self,
        reader: &mut ByteReader,
        frame_timestamp: Option<i64>,
        out: &mut Vec<Measurement>,
    ) -> Result<()> {
        let compact = reader.read_u8()?;
        let uses_offset = compact & compact_flags::BASE_TIME_OFFSET != 0;
        let time_index = usize::from(compact & compact_flags::TIME_INDEX != 0);

        let runtime_index = reader.read_u16_be()?;

        let mut timestamp = 0;
        if self.include_time {
            timestamp = if !uses_offset {
                reader.read_i64_be()?
            } else if !self.millisecond_resolution {
                self.base_times.offsets[time_index] + i64::from(reader.read_u32_be()?)
            } else {
                self.base_times.offsets[time_index]
                    + i64::from(reader.read_u16_be()?) * TICKS_PER_MILLISECOND
            };
        }

        let value = reader.read_f32_be()?;

        // Unknown index: the publisher revoked or never issued it; drop
        let Some(key) = self.cache.get(runtime_index) else {
            return Ok(());
        };

        out.push(Measurement {
            signal_id: key.signal_id,
            source: key.source.clone(),
            id: key.id,
            timestamp: frame_timestamp.unwrap_or(timestamp),
            flags: map_to_full_flags(compact),
            value,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeasurementKey;
    use uuid::Uuid;

    fn test_cache() -> SignalIndexCache {
        let mut cache = SignalIndexCache::new();
        cache.insert(
            1,
            MeasurementKey {
                signal_id: Uuid::new_v4(),
                source: "PPA".to_string(),
                id: 101,
            },
        );
        cache.insert(
            2,
            MeasurementKey {
                signal_id: Uuid::new_v4(),
                source: "PPA".to_string(),
                id: 102,
            },
        );
        cache
    }

    fn push_measurement(
        buf: &mut Vec<u8>,
        flags: u8,
        index: u16,
        time_bytes: &[u8],
        value: f32,
    ) {
        buf.push(flags);
        buf.extend_from_slice(&index.to_be_bytes());
        buf.extend_from_slice(time_bytes);
        buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    #[test]
    fn test_full_timestamp() {
        let cache = test_cache();
        let mut data = Vec::new();
        push_measurement(&mut data, 0, 1, &1_000_000i64.to_be_bytes(), 60.05);

        let decoder = CompactDecoder::new(&cache, BaseTimes::default(), true, false);
        let mut out = Vec::new();
        decoder
            .decode_all(&mut ByteReader::new(&data), None, &mut out)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 101);
        assert_eq!(out[0].timestamp, 1_000_000);
        assert_eq!(out[0].value, 60.05);
        assert_eq!(out[0].flags, 0);
    }

    #[test]
    fn test_base_time_offset_tick_resolution() {
        let cache = test_cache();
        let base_times = BaseTimes {
            offsets: [5_000_000, 9_000_000],
            time_index: 0,
        };

        let mut data = Vec::new();
        push_measurement(
            &mut data,
            compact_flags::BASE_TIME_OFFSET,
            1,
            &1234u32.to_be_bytes(),
            1.0,
        );
        // Second anchor selected by the time-index flag
        push_measurement(
            &mut data,
            compact_flags::BASE_TIME_OFFSET | compact_flags::TIME_INDEX,
            2,
            &10u32.to_be_bytes(),
            2.0,
        );

        let decoder = CompactDecoder::new(&cache, base_times, true, false);
        let mut out = Vec::new();
        decoder
            .decode_all(&mut ByteReader::new(&data), None, &mut out)
            .unwrap();

        assert_eq!(out[0].timestamp, 5_001_234);
        assert_eq!(out[1].timestamp, 9_000_010);
    }

    #[test]
    fn test_millisecond_resolution() {
        let cache = test_cache();
        let base_times = BaseTimes {
            offsets: [1_000_000, 0],
            time_index: 0,
        };

        let mut data = Vec::new();
        push_measurement(
            &mut data,
            compact_flags::BASE_TIME_OFFSET,
            1,
            &3u16.to_be_bytes(),
            1.0,
        );

        let decoder = CompactDecoder::new(&cache, base_times, true, true);
        let mut out = Vec::new();
        decoder
            .decode_all(&mut ByteReader::new(&data), None, &mut out)
            .unwrap();

        assert_eq!(out[0].timestamp, 1_000_000 + 3 * TICKS_PER_MILLISECOND);
    }

    #[test]
    fn test_frame_timestamp_overrides() {
        let cache = test_cache();
        let mut data = Vec::new();
        // include_time = false: no per-measurement time on the wire
        push_measurement(&mut data, 0, 1, &[], 1.0);
        push_measurement(&mut data, 0, 2, &[], 2.0);

        let decoder = CompactDecoder::new(&cache, BaseTimes::default(), false, false);
        let mut out = Vec::new();
        decoder
            .decode_all(&mut ByteReader::new(&data), Some(777), &mut out)
            .unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.timestamp == 777));
    }

    #[test]
    fn test_unknown_index_dropped_silently() {
        let cache = test_cache();
        let mut data = Vec::new();
        push_measurement(&mut data, 0, 42, &100i64.to_be_bytes(), 1.0);
        push_measurement(&mut data, 0, 1, &200i64.to_be_bytes(), 2.0);

        let decoder = CompactDecoder::new(&cache, BaseTimes::default(), true, false);
        let mut out = Vec::new();
        decoder
            .decode_all(&mut ByteReader::new(&data), None, &mut out)
            .unwrap();

        // Index 42 produced nothing, index 1 still decoded
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp, 200);
    }

    #[test]
    fn test_truncated_measurement_errors_keeping_decoded() {
        let cache = test_cache();
        let mut data = Vec::new();
        push_measurement(&mut data, 0, 1, &100i64.to_be_bytes(), 1.0);
        data.extend_from_slice(&[0x00, 0x00]); // partial trailing measurement

        let decoder = CompactDecoder::new(&cache, BaseTimes::default(), true, false);
        let mut out = Vec::new();
        assert!(decoder
            .decode_all(&mut ByteReader::new(&data), None, &mut out)
            .is_err());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_flag_expansion() {
        assert_eq!(map_to_full_flags(0), 0);
        assert_eq!(
            map_to_full_flags(compact_flags::DATA_QUALITY),
            0x0000_EF03
        );
        assert_eq!(
            map_to_full_flags(compact_flags::CALCULATED_VALUE | compact_flags::SYSTEM_ISSUE),
            0xE000_1000
        );
        // Timestamp layout bits carry no state flags
        assert_eq!(
            map_to_full_flags(compact_flags::BASE_TIME_OFFSET | compact_flags::TIME_INDEX),
            0
        );
    }
}
