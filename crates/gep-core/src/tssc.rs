//! TSSC stream decoder
//!
//! Stateful, bit-packed decoder for the protocol's compressed measurement
//! stream. Decoder state persists across the packets of one subscription and
//! is discarded on reset; the session layer owns the packet-level version and
//! sequence-number checks.
//!
//! Each decoded measurement carries the code-word context for the next one:
//! the point addressed by the previous measurement supplies the prefix table
//! used to read the following code words, and every point adapts its own
//! prefix table to the codes observed for it.

use crate::error::{Error, Result};
use crate::wire::{read_7bit_u32, read_7bit_u64};

/// Version byte leading every TSSC packet body.
pub const TSSC_VERSION: u8 = 0x55;

mod code {
    pub const END_OF_STREAM: u8 = 0;

    pub const POINT_ID_XOR4: u8 = 1;
    pub const POINT_ID_XOR8: u8 = 2;
    pub const POINT_ID_XOR12: u8 = 3;
    pub const POINT_ID_XOR16: u8 = 4;

    pub const TIME_DELTA1_FORWARD: u8 = 5;
    pub const TIME_DELTA2_FORWARD: u8 = 6;
    pub const TIME_DELTA3_FORWARD: u8 = 7;
    pub const TIME_DELTA4_FORWARD: u8 = 8;
    pub const TIME_DELTA1_REVERSE: u8 = 9;
    pub const TIME_DELTA2_REVERSE: u8 = 10;
    pub const TIME_DELTA3_REVERSE: u8 = 11;
    pub const TIME_DELTA4_REVERSE: u8 = 12;
    pub const TIMESTAMP2: u8 = 13;
    pub const TIME_XOR_7BIT: u8 = 14;

    pub const QUALITY2: u8 = 15;
    pub const QUALITY_7BIT32: u8 = 16;

    pub const VALUE1: u8 = 17;
    pub const VALUE2: u8 = 18;
    pub const VALUE3: u8 = 19;
    pub const VALUE_ZERO: u8 = 20;
    pub const VALUE_XOR4: u8 = 21;
    pub const VALUE_XOR8: u8 = 22;
    pub const VALUE_XOR12: u8 = 23;
    pub const VALUE_XOR16: u8 = 24;
    pub const VALUE_XOR20: u8 = 25;
    pub const VALUE_XOR24: u8 = 26;
    pub const VALUE_XOR28: u8 = 27;
    pub const VALUE_XOR32: u8 = 28;
}

const CODE_WORD_COUNT: usize = 32;

/// One decoded TSSC tuple, prior to signal-index resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsscSample {
    pub runtime_index: u16,
    pub timestamp: i64,
    pub quality: u32,
    pub value: f32,
}

/// Packet bytes plus the inline bit stream.
///
/// Bit-cache bytes are interleaved with byte-aligned fields: whenever a bit
/// is needed and the cache is empty, the byte at the current position is
/// consumed as the next eight bits.
#[derive(Debug, Default)]
struct ByteStream {
    data: Vec<u8>,
    position: usize,
    bit_cache: u8,
    bit_count: u8,
}

impl ByteStream {
    fn set(&mut self, data: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.position = 0;
    }

    fn at_end(&self) -> bool {
        self.position == self.data.len()
    }

    fn bits_empty(&self) -> bool {
        self.bit_count == 0
    }

    fn clear_bits(&mut self) {
        self.bit_count = 0;
        self.bit_cache = 0;
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.position).ok_or(Error::BufferTooSmall {
            needed: self.position + 1,
            have: self.data.len(),
        })?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bit(&mut self) -> Result<u8> {
        if self.bit_count == 0 {
            self.bit_cache = self.read_u8()?;
            self.bit_count = 8;
        }
        self.bit_count -= 1;
        Ok((self.bit_cache >> self.bit_count) & 1)
    }

    fn read_bits4(&mut self) -> Result<u8> {
        Ok(self.read_bit()? << 3 | self.read_bit()? << 2 | self.read_bit()? << 1 | self.read_bit()?)
    }

    fn read_bits5(&mut self) -> Result<u8> {
        Ok(self.read_bit()? << 4 | self.read_bits4()?)
    }

    fn read_7bit_u32(&mut self) -> Result<u32> {
        read_7bit_u32(&self.data, &mut self.position)
    }

    fn read_7bit_u64(&mut self) -> Result<u64> {
        read_7bit_u64(&self.data, &mut self.position)
    }
}

/// Per-point decode context: value/quality history plus the adaptive
/// code-word prefix table.
#[derive(Debug, Clone)]
struct PointMetadata {
    prev_next_point_id: u16,
    prev_quality1: u32,
    prev_quality2: u32,
    prev_value1: u32,
    prev_value2: u32,
    prev_value3: u32,

    command_stats: [u8; CODE_WORD_COUNT],
    commands_since_change: u32,

    // Prefix mode: 1 = raw 5-bit codes; modes 2-4 escape the most frequent
    // one/two/three codes behind 1/2/3-bit prefixes.
    mode: u8,
    mode21: u8,
    mode31: u8,
    mode301: u8,
    mode41: u8,
    mode401: u8,
    mode4001: u8,
    startup_mode: u8,
}

impl PointMetadata {
    fn new() -> Self {
        Self {
            prev_next_point_id: 0,
            prev_quality1: 0,
            prev_quality2: 0,
            prev_value1: 0,
            prev_value2: 0,
            prev_value3: 0,
            command_stats: [0; CODE_WORD_COUNT],
            commands_since_change: 0,
            mode: 4,
            mode21: 0,
            mode31: 0,
            mode301: 0,
            mode41: code::VALUE1,
            mode401: code::VALUE2,
            mode4001: code::VALUE3,
            startup_mode: 0,
        }
    }

    fn read_code(&mut self, stream: &mut ByteStream) -> Result<u8> {
        let word = match self.mode {
            1 => stream.read_bits5()?,
            2 => {
                if stream.read_bit()? == 1 {
                    self.mode21
                } else {
                    stream.read_bits5()?
                }
            }
            3 => {
                if stream.read_bit()? == 1 {
                    self.mode31
                } else if stream.read_bit()? == 1 {
                    self.mode301
                } else {
                    stream.read_bits5()?
                }
            }
            4 => {
                if stream.read_bit()? == 1 {
                    self.mode41
                } else if stream.read_bit()? == 1 {
                    self.mode401
                } else if stream.read_bit()? == 1 {
                    self.mode4001
                } else {
                    stream.read_bits5()?
                }
            }
            mode => return Err(Error::Tssc(format!("unsupported prefix mode {mode}"))),
        };

        if usize::from(word) >= CODE_WORD_COUNT {
            return Err(Error::Tssc(format!("invalid code word {word}")));
        }

        self.update_statistics(word);
        Ok(word)
    }

    fn update_statistics(&mut self, word: u8) {
        self.commands_since_change += 1;
        self.command_stats[usize::from(word)] =
            self.command_stats[usize::from(word)].saturating_add(1);

        if self.startup_mode == 0 && self.commands_since_change > 5 {
            self.startup_mode = 1;
            self.adapt_commands();
        } else if self.startup_mode == 1 && self.commands_since_change > 20 {
            self.startup_mode = 2;
            self.adapt_commands();
        } else if self.startup_mode == 2 && self.commands_since_change > 100 {
            self.adapt_commands();
        }
    }

    // Re-derives the prefix table from observed code frequencies, picking
    // the mode with the smallest projected bit cost.
    fn adapt_commands(&mut self) {
        let mut code1 = 0u8;
        let mut count1 = 0u32;
        let mut code2 = 1u8;
        let mut count2 = 0u32;
        let mut code3 = 2u8;
        let mut count3 = 0u32;
        let mut total = 0u32;

        for (word, stat) in self.command_stats.iter_mut().enumerate() {
            let count = u32::from(*stat);
            *stat = 0;
            total += count;

            if count > count3 {
                if count > count1 {
                    code3 = code2;
                    count3 = count2;
                    code2 = code1;
                    count2 = count1;
                    code1 = word as u8;
                    count1 = count;
                } else if count > count2 {
                    code3 = code2;
                    count3 = count2;
                    code2 = word as u8;
                    count2 = count;
                } else {
                    code3 = word as u8;
                    count3 = count;
                }
            }
        }

        let mode1_size = total * 5;
        let mode2_size = count1 + (total - count1) * 6;
        let mode3_size = count1 + count2 * 2 + (total - count1 - count2) * 7;
        let mode4_size = count1 + count2 * 2 + count3 * 3 + (total - count1 - count2 - count3) * 8;

        let min_size = mode1_size.min(mode2_size).min(mode3_size).min(mode4_size);

        if min_size == mode1_size {
            self.mode = 1;
        } else if min_size == mode2_size {
            self.mode = 2;
            self.mode21 = code1;
        } else if min_size == mode3_size {
            self.mode = 3;
            self.mode31 = code1;
            self.mode301 = code2;
        } else {
            self.mode = 4;
            self.mode41 = code1;
            self.mode401 = code2;
            self.mode4001 = code3;
        }

        self.commands_since_change = 0;
    }
}

/// Stateful TSSC decoder for one subscription's data stream.
#[derive(Debug)]
pub struct TsscDecoder {
    stream: ByteStream,

    prev_timestamp1: i64,
    prev_timestamp2: i64,
    prev_time_delta: [i64; 4],

    // Code-word context before the first point of the stream is known
    root_point: PointMetadata,
    // Index into `points` of the context for the next code word; None selects
    // the root
    last_point: Option<u16>,
    points: Vec<Option<PointMetadata>>,
}

impl Default for TsscDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TsscDecoder {
    pub fn new() -> Self {
        Self {
            stream: ByteStream::default(),
            prev_timestamp1: 0,
            prev_timestamp2: 0,
            prev_time_delta: [i64::MAX; 4],
            root_point: PointMetadata::new(),
            last_point: None,
            points: Vec::new(),
        }
    }

    /// Discards all decode state, as if the stream were starting fresh.
    pub fn reset(&mut self) {
        self.stream = ByteStream::default();
        self.prev_timestamp1 = 0;
        self.prev_timestamp2 = 0;
        self.prev_time_delta = [i64::MAX; 4];
        self.root_point = PointMetadata::new();
        self.last_point = None;
        self.points.clear();
    }

    /// Loads the compressed body of the next packet in the sequence.
    pub fn set_buffer(&mut self, data: &[u8]) {
        self.stream.set(data);
    }

    /// Decodes the next measurement of the current buffer, or `None` at end
    /// of stream.
    pub fn try_get_measurement(&mut self) -> Result<Option<TsscSample>> {
        if self.stream.at_end() && self.stream.bits_empty() {
            self.stream.clear_bits();
            return Ok(None);
        }

        let mut word = self.read_code()?;

        if word == code::END_OF_STREAM {
            self.stream.clear_bits();
            return Ok(None);
        }

        if word <= code::POINT_ID_XOR16 {
            self.decode_point_id(word)?;
            word = self.read_code()?;
            if word < code::TIME_DELTA1_FORWARD {
                return Err(Error::Tssc(format!(
                    "expecting code {} or higher, received {} at position {}",
                    code::TIME_DELTA1_FORWARD,
                    word,
                    self.stream.position
                )));
            }
        }

        let point_id = self.current_point().prev_next_point_id;
        self.ensure_point(point_id);

        let timestamp = if word <= code::TIME_XOR_7BIT {
            let timestamp = self.decode_timestamp(word)?;
            word = self.read_code()?;
            if word < code::QUALITY2 {
                return Err(Error::Tssc(format!(
                    "expecting code {} or higher, received {} at position {}",
                    code::QUALITY2,
                    word,
                    self.stream.position
                )));
            }
            timestamp
        } else {
            self.prev_timestamp1
        };

        let quality = if word <= code::QUALITY_7BIT32 {
            let quality = self.decode_quality(word, point_id)?;
            word = self.read_code()?;
            if word < code::VALUE1 {
                return Err(Error::Tssc(format!(
                    "expecting code {} or higher, received {} at position {}",
                    code::VALUE1,
                    word,
                    self.stream.position
                )));
            }
            quality
        } else {
            self.point(point_id).prev_quality1
        };

        let value = self.decode_value(word, point_id)?;

        self.last_point = Some(point_id);

        Ok(Some(TsscSample {
            runtime_index: point_id,
            timestamp,
            quality,
            value,
        }))
    }

    fn current_point(&self) -> &PointMetadata {
        match self.last_point {
            None => &self.root_point,
            Some(index) => self.point(index),
        }
    }

    fn read_code(&mut self) -> Result<u8> {
        let point = match self.last_point {
            None => &mut self.root_point,
            Some(index) => match self.points.get_mut(usize::from(index)).and_then(Option::as_mut)
            {
                Some(point) => point,
                None => return Err(Error::Tssc(format!("missing metadata for point {index}"))),
            },
        };
        point.read_code(&mut self.stream)
    }

    fn ensure_point(&mut self, point_id: u16) {
        let slot = usize::from(point_id);
        if self.points.len() <= slot {
            self.points.resize(slot + 1, None);
        }
        if self.points[slot].is_none() {
            let mut fresh = PointMetadata::new();
            fresh.prev_next_point_id = point_id.wrapping_add(1);
            self.points[slot] = Some(fresh);
        }
    }

    fn point(&self, point_id: u16) -> &PointMetadata {
        self.points
            .get(usize::from(point_id))
            .and_then(Option::as_ref)
            .unwrap_or(&self.root_point)
    }

    fn point_mut(&mut self, point_id: u16) -> Result<&mut PointMetadata> {
        self.points
            .get_mut(usize::from(point_id))
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Tssc(format!("missing metadata for point {point_id}")))
    }

    fn decode_point_id(&mut self, word: u8) -> Result<()> {
        let xor = match word {
            code::POINT_ID_XOR4 => u16::from(self.stream.read_bits4()?),
            code::POINT_ID_XOR8 => u16::from(self.stream.read_u8()?),
            code::POINT_ID_XOR12 => {
                let low = u16::from(self.stream.read_bits4()?);
                low | u16::from(self.stream.read_u8()?) << 4
            }
            _ => {
                let low = u16::from(self.stream.read_u8()?);
                low | u16::from(self.stream.read_u8()?) << 8
            }
        };

        match self.last_point {
            None => self.root_point.prev_next_point_id ^= xor,
            Some(index) => match self.points.get_mut(usize::from(index)).and_then(Option::as_mut)
            {
                Some(point) => point.prev_next_point_id ^= xor,
                None => return Err(Error::Tssc(format!("missing metadata for point {index}"))),
            },
        }
        Ok(())
    }

    fn decode_timestamp(&mut self, word: u8) -> Result<i64> {
        let timestamp = match word {
            code::TIME_DELTA1_FORWARD => self.prev_timestamp1.wrapping_add(self.prev_time_delta[0]),
            code::TIME_DELTA2_FORWARD => self.prev_timestamp1.wrapping_add(self.prev_time_delta[1]),
            code::TIME_DELTA3_FORWARD => self.prev_timestamp1.wrapping_add(self.prev_time_delta[2]),
            code::TIME_DELTA4_FORWARD => self.prev_timestamp1.wrapping_add(self.prev_time_delta[3]),
            code::TIME_DELTA1_REVERSE => self.prev_timestamp1.wrapping_sub(self.prev_time_delta[0]),
            code::TIME_DELTA2_REVERSE => self.prev_timestamp1.wrapping_sub(self.prev_time_delta[1]),
            code::TIME_DELTA3_REVERSE => self.prev_timestamp1.wrapping_sub(self.prev_time_delta[2]),
            code::TIME_DELTA4_REVERSE => self.prev_timestamp1.wrapping_sub(self.prev_time_delta[3]),
            code::TIMESTAMP2 => self.prev_timestamp2,
            _ => self.prev_timestamp1 ^ self.stream.read_7bit_u64()? as i64,
        };

        // Keep the four smallest distinct deltas observed
        let delta = self.prev_timestamp1.wrapping_sub(timestamp).wrapping_abs();
        let [d1, d2, d3, d4] = self.prev_time_delta;

        if delta < d4 && delta != d1 && delta != d2 && delta != d3 {
            if delta < d1 {
                self.prev_time_delta = [delta, d1, d2, d3];
            } else if delta < d2 {
                self.prev_time_delta = [d1, delta, d2, d3];
            } else if delta < d3 {
                self.prev_time_delta = [d1, d2, delta, d3];
            } else {
                self.prev_time_delta = [d1, d2, d3, delta];
            }
        }

        self.prev_timestamp2 = self.prev_timestamp1;
        self.prev_timestamp1 = timestamp;
        Ok(timestamp)
    }

    fn decode_quality(&mut self, word: u8, point_id: u16) -> Result<u32> {
        let quality = if word == code::QUALITY2 {
            self.point(point_id).prev_quality2
        } else {
            self.stream.read_7bit_u32()?
        };

        let point = self.point_mut(point_id)?;
        if quality != point.prev_quality1 {
            point.prev_quality2 = point.prev_quality1;
            point.prev_quality1 = quality;
        }

        Ok(quality)
    }

    fn decode_value(&mut self, word: u8, point_id: u16) -> Result<f32> {
        let stream = &mut self.stream;
        let point = self
            .points
            .get_mut(usize::from(point_id))
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Tssc(format!("missing metadata for point {point_id}")))?;

        let raw = match word {
            code::VALUE1 => point.prev_value1,
            code::VALUE2 => {
                let raw = point.prev_value2;
                point.prev_value2 = point.prev_value1;
                point.prev_value1 = raw;
                raw
            }
            code::VALUE3 => {
                let raw = point.prev_value3;
                point.prev_value3 = point.prev_value2;
                point.prev_value2 = point.prev_value1;
                point.prev_value1 = raw;
                raw
            }
            code::VALUE_ZERO => {
                point.prev_value3 = point.prev_value2;
                point.prev_value2 = point.prev_value1;
                point.prev_value1 = 0;
                0
            }
            _ => {
                let xor = match word {
                    code::VALUE_XOR4 => u32::from(stream.read_bits4()?),
                    code::VALUE_XOR8 => u32::from(stream.read_u8()?),
                    code::VALUE_XOR12 => {
                        let low = u32::from(stream.read_bits4()?);
                        low ^ u32::from(stream.read_u8()?) << 4
                    }
                    code::VALUE_XOR16 => {
                        let low = u32::from(stream.read_u8()?);
                        low ^ u32::from(stream.read_u8()?) << 8
                    }
                    code::VALUE_XOR20 => {
                        let low = u32::from(stream.read_bits4()?);
                        let mid = u32::from(stream.read_u8()?) << 4;
                        low ^ mid ^ u32::from(stream.read_u8()?) << 12
                    }
                    code::VALUE_XOR24 => {
                        let low = u32::from(stream.read_u8()?);
                        let mid = u32::from(stream.read_u8()?) << 8;
                        low ^ mid ^ u32::from(stream.read_u8()?) << 16
                    }
                    code::VALUE_XOR28 => {
                        let low = u32::from(stream.read_bits4()?);
                        let mid1 = u32::from(stream.read_u8()?) << 4;
                        let mid2 = u32::from(stream.read_u8()?) << 12;
                        low ^ mid1 ^ mid2 ^ u32::from(stream.read_u8()?) << 20
                    }
                    code::VALUE_XOR32 => {
                        let b0 = u32::from(stream.read_u8()?);
                        let b1 = u32::from(stream.read_u8()?) << 8;
                        let b2 = u32::from(stream.read_u8()?) << 16;
                        b0 ^ b1 ^ b2 ^ u32::from(stream.read_u8()?) << 24
                    }
                    _ => {
                        return Err(Error::Tssc(format!(
                            "invalid value code {word} at position {}",
                            stream.position
                        )))
                    }
                };

                let raw = xor ^ point.prev_value1;
                point.prev_value3 = point.prev_value2;
                point.prev_value2 = point.prev_value1;
                point.prev_value1 = raw;
                raw
            }
        };

        Ok(f32::from_bits(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal bit-accurate writer mirroring the decoder's consumption
    /// order: bit-cache bytes open at the first bit written and keep filling
    /// even after byte-aligned fields are appended behind them.
    #[derive(Default)]
    struct StreamWriter {
        data: Vec<u8>,
        bit_byte: Option<(usize, u8)>,
    }

    impl StreamWriter {
        fn write_bit(&mut self, bit: u8) {
            match self.bit_byte {
                Some((index, filled)) if filled < 8 => {
                    self.data[index] |= bit << (7 - filled);
                    self.bit_byte = if filled + 1 == 8 {
                        None
                    } else {
                        Some((index, filled + 1))
                    };
                }
                _ => {
                    self.data.push(bit << 7);
                    self.bit_byte = Some((self.data.len() - 1, 1));
                }
            }
        }

        fn write_bits(&mut self, value: u32, count: u8) {
            for shift in (0..count).rev() {
                self.write_bit(((value >> shift) & 1) as u8);
            }
        }

        /// Raw code word through the default mode-4 escape table (000 + 5
        /// bits always decodes to the raw word).
        fn write_code(&mut self, word: u8) {
            self.write_bits(0, 3);
            self.write_bits(u32::from(word), 5);
        }

        fn write_byte(&mut self, byte: u8) {
            self.data.push(byte);
        }

        fn write_7bit(&mut self, mut value: u64) {
            while value >= 0x80 {
                self.data.push(value as u8 | 0x80);
                value >>= 7;
            }
            self.data.push(value as u8);
        }
    }

    fn write_measurement(w: &mut StreamWriter, point_xor: u16, timestamp_xor: u64, quality: u32, value_bits: u32) {
        if point_xor != 0 {
            w.write_code(code::POINT_ID_XOR4);
            w.write_bits(u32::from(point_xor), 4);
        }
        w.write_code(code::TIME_XOR_7BIT);
        w.write_7bit(timestamp_xor);
        w.write_code(code::QUALITY_7BIT32);
        w.write_7bit(u64::from(quality));
        w.write_code(code::VALUE_XOR32);
        w.write_byte(value_bits as u8);
        w.write_byte((value_bits >> 8) as u8);
        w.write_byte((value_bits >> 16) as u8);
        w.write_byte((value_bits >> 24) as u8);
    }

    #[test]
    fn test_decode_single_measurement() {
        let mut writer = StreamWriter::default();
        write_measurement(&mut writer, 1, 1000, 3, 1.5f32.to_bits());
        writer.write_code(code::END_OF_STREAM);

        let mut decoder = TsscDecoder::new();
        decoder.set_buffer(&writer.data);

        let sample = decoder.try_get_measurement().unwrap().unwrap();
        assert_eq!(sample.runtime_index, 1);
        assert_eq!(sample.timestamp, 1000);
        assert_eq!(sample.quality, 3);
        assert_eq!(sample.value, 1.5);

        assert!(decoder.try_get_measurement().unwrap().is_none());
    }

    #[test]
    fn test_state_persists_across_packets() {
        let mut decoder = TsscDecoder::new();

        let mut first = StreamWriter::default();
        write_measurement(&mut first, 1, 1000, 3, 1.5f32.to_bits());
        first.write_code(code::END_OF_STREAM);
        decoder.set_buffer(&first.data);
        assert!(decoder.try_get_measurement().unwrap().is_some());
        assert!(decoder.try_get_measurement().unwrap().is_none());

        // Second packet re-addresses point 1 relative to its stored state:
        // the point's next-id predictor sits at 2, so the XOR is 3, the
        // quality repeats, and the value replays from history.
        let mut second = StreamWriter::default();
        second.write_code(code::POINT_ID_XOR4);
        second.write_bits(3, 4);
        second.write_code(code::TIME_DELTA1_FORWARD);
        second.write_code(code::QUALITY_7BIT32);
        second.write_7bit(3);
        second.write_code(code::VALUE1);
        second.write_code(code::END_OF_STREAM);

        decoder.set_buffer(&second.data);
        let sample = decoder.try_get_measurement().unwrap().unwrap();
        assert_eq!(sample.runtime_index, 1);
        // Delta table learned |0 - 1000| from the first packet
        assert_eq!(sample.timestamp, 2000);
        assert_eq!(sample.quality, 3);
        assert_eq!(sample.value, 1.5);
    }

    #[test]
    fn test_reset_discards_history() {
        let mut decoder = TsscDecoder::new();

        let mut packet = StreamWriter::default();
        write_measurement(&mut packet, 1, 1000, 3, 1.5f32.to_bits());
        packet.write_code(code::END_OF_STREAM);
        decoder.set_buffer(&packet.data);
        assert!(decoder.try_get_measurement().unwrap().is_some());

        decoder.reset();

        // After reset the same byte stream decodes identically to a fresh
        // decoder
        decoder.set_buffer(&packet.data);
        let sample = decoder.try_get_measurement().unwrap().unwrap();
        assert_eq!(sample.runtime_index, 1);
        assert_eq!(sample.timestamp, 1000);
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let mut decoder = TsscDecoder::new();
        decoder.set_buffer(&[]);
        assert!(decoder.try_get_measurement().unwrap().is_none());
    }

    #[test]
    fn test_value_history_replay() {
        let mut writer = StreamWriter::default();
        write_measurement(&mut writer, 1, 1000, 0, 2.25f32.to_bits());
        // Same point again inside one packet: XOR 3 (predictor moved to 2),
        // repeat timestamp via prev, value replays history slot 1
        writer.write_code(code::POINT_ID_XOR4);
        writer.write_bits(3, 4);
        writer.write_code(code::TIMESTAMP2);
        writer.write_code(code::QUALITY_7BIT32);
        writer.write_7bit(0);
        writer.write_code(code::VALUE1);
        writer.write_code(code::END_OF_STREAM);

        let mut decoder = TsscDecoder::new();
        decoder.set_buffer(&writer.data);

        let first = decoder.try_get_measurement().unwrap().unwrap();
        assert_eq!(first.value, 2.25);
        let second = decoder.try_get_measurement().unwrap().unwrap();
        assert_eq!(second.runtime_index, 1);
        assert_eq!(second.value, 2.25);
        // TIMESTAMP2 replays the timestamp before the last one (initial zero)
        assert_eq!(second.timestamp, 0);
        assert!(decoder.try_get_measurement().unwrap().is_none());
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut writer = StreamWriter::default();
        writer.write_code(code::POINT_ID_XOR4);
        writer.write_bits(1, 4);
        writer.write_code(code::TIME_XOR_7BIT);
        // 7-bit timestamp field missing

        let mut decoder = TsscDecoder::new();
        decoder.set_buffer(&writer.data);
        assert!(decoder.try_get_measurement().is_err());
    }
}
