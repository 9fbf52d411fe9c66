//! Signal index cache
//!
//! Maps the publisher's compact 16-bit runtime indices to full measurement
//! identities. The publisher replaces the whole mapping on every
//! `UpdateSignalIndexCache` response; entries are never mutated
//! incrementally.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::MeasurementKey;
use crate::wire::ByteReader;

/// In-memory runtime-index → measurement-key mapping.
#[derive(Debug, Default, Clone)]
pub struct SignalIndexCache {
    keys: HashMap<u16, MeasurementKey>,
}

impl SignalIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn insert(&mut self, runtime_index: u16, key: MeasurementKey) {
        self.keys.insert(runtime_index, key);
    }

    /// Looks up a runtime index; absent indices are a normal condition (the
    /// decoders drop such measurements).
    pub fn get(&self, runtime_index: u16) -> Option<&MeasurementKey> {
        self.keys.get(&runtime_index)
    }

    pub fn contains(&self, runtime_index: u16) -> bool {
        self.keys.contains_key(&runtime_index)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Clears the cache and rebuilds it from an uncompressed cache image.
    ///
    /// The image is: big-endian total length (ignored), 16-byte subscriber
    /// GUID (ignored), reference count, then per-signal records of runtime
    /// index, signal GUID, length-prefixed source string, and numeric id. An
    /// unauthorized-signals section trails the records and is not consumed.
    ///
    /// Clearing happens before parsing, so a truncated image leaves a
    /// smaller but internally consistent cache and an error return.
    pub fn rebuild_from(&mut self, image: &[u8]) -> Result<()> {
        self.keys.clear();

        let mut reader = ByteReader::new(image);
        let _total_length = reader.read_u32_be()?;
        reader.skip(16)?;
        let reference_count = reader.read_u32_be()?;

        for _ in 0..reference_count {
            let runtime_index = reader.read_u16_be()?;
            let signal_id = reader.read_guid()?;
            let source_length = reader.read_u32_be()? as usize;
            let source = String::from_utf8(reader.read_bytes(source_length)?.to_vec())?;
            let id = reader.read_u32_be()?;

            self.keys.insert(
                runtime_index,
                MeasurementKey {
                    signal_id,
                    source,
                    id,
                },
            );
        }

        debug!(signals = self.keys.len(), "signal index cache rebuilt");
        Ok(())
    }
}

/// Inflates a GZip-compressed payload.
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decompressed)
        .map_err(|e| Error::Decompress(e.to_string()))?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use uuid::Uuid;

    fn encode_image(entries: &[(u16, Uuid, &str, u32)]) -> Vec<u8> {
        let mut image = Vec::new();
        image.extend_from_slice(&0u32.to_be_bytes());
        image.extend_from_slice(&[0u8; 16]);
        image.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for (index, signal_id, source, id) in entries {
            image.extend_from_slice(&index.to_be_bytes());
            image.extend_from_slice(&signal_id.to_bytes_le());
            image.extend_from_slice(&(source.len() as u32).to_be_bytes());
            image.extend_from_slice(source.as_bytes());
            image.extend_from_slice(&id.to_be_bytes());
        }
        image
    }

    #[test]
    fn test_rebuild_parses_entries() {
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();
        let image = encode_image(&[(1, g1, "PPA", 100), (2, g2, "PPB", 200)]);

        let mut cache = SignalIndexCache::new();
        cache.rebuild_from(&image).unwrap();

        assert_eq!(cache.len(), 2);
        let key = cache.get(1).unwrap();
        assert_eq!(key.signal_id, g1);
        assert_eq!(key.source, "PPA");
        assert_eq!(key.id, 100);
        assert_eq!(cache.get(2).unwrap().id, 200);
        assert!(cache.get(3).is_none());
    }

    #[test]
    fn test_rebuild_replaces_not_merges() {
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();
        let g3 = Uuid::new_v4();

        let mut cache = SignalIndexCache::new();
        cache
            .rebuild_from(&encode_image(&[(1, g1, "S1", 100), (2, g2, "S2", 200)]))
            .unwrap();
        cache
            .rebuild_from(&encode_image(&[(3, g3, "S3", 300)]))
            .unwrap();

        // Applying A then B must equal applying B alone
        let mut fresh = SignalIndexCache::new();
        fresh
            .rebuild_from(&encode_image(&[(3, g3, "S3", 300)]))
            .unwrap();

        assert!(!cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.len(), fresh.len());
    }

    #[test]
    fn test_truncated_image_keeps_parsed_prefix() {
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();
        let mut image = encode_image(&[(1, g1, "S1", 100), (2, g2, "S2", 200)]);
        image.truncate(image.len() - 2);

        let mut cache = SignalIndexCache::new();
        cache
            .rebuild_from(&encode_image(&[(9, g1, "OLD", 9)]))
            .unwrap();

        assert!(cache.rebuild_from(&image).is_err());
        // Old contents are gone, the first record survived
        assert!(!cache.contains(9));
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
    }

    #[test]
    fn test_gzip_round_trip() {
        let g1 = Uuid::new_v4();
        let image = encode_image(&[(7, g1, "PPA", 42)]);

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&image).unwrap();
        let compressed = encoder.finish().unwrap();

        let inflated = decompress_gzip(&compressed).unwrap();
        let mut cache = SignalIndexCache::new();
        cache.rebuild_from(&inflated).unwrap();
        assert_eq!(cache.get(7).unwrap().id, 42);
    }

    #[test]
    fn test_gzip_garbage_fails() {
        assert!(decompress_gzip(&[0x00, 0x01, 0x02]).is_err());
    }
}
