//! 32-bit landmark hashes and the per-clip hash table.
//!
//! Layout: `f1` in bits 22..32, `f2` in bits 12..22, `dt` in bits 0..12.
//! Values wider than their field are masked, so distinct out-of-range
//! triples may collide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tunemark_core::{HashRow, QueryRow};

use crate::types::Fingerprint;

const FREQ_MASK: u32 = 0x3FF;
const DELTA_MASK: u32 = 0xFFF;

/// Pack a pair into its 32-bit hash.
pub fn encode_hash(f1: u32, f2: u32, dt: u32) -> u32 {
    ((f1 & FREQ_MASK) << 22) | ((f2 & FREQ_MASK) << 12) | (dt & DELTA_MASK)
}

/// Unpack a hash into `(f1, f2, dt)`.
pub fn decode_hash(hash: u32) -> (u32, u32, u32) {
    ((hash >> 22) & FREQ_MASK, (hash >> 12) & FREQ_MASK, hash & DELTA_MASK)
}

/// Hash -> anchor frames, ascending by hash.
///
/// Offsets keep generation order and duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashTable(BTreeMap<u32, Vec<u32>>);

impl HashTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group fingerprints by encoded hash.
    pub fn from_fingerprints(fingerprints: &[Fingerprint]) -> Self {
        let mut table = Self::new();
        for fp in fingerprints {
            table.insert(
                encode_hash(fp.anchor_bin, fp.target_bin, fp.delta),
                fp.anchor_frame,
            );
        }
        table
    }

    pub fn insert(&mut self, hash: u32, offset: u32) {
        self.0.entry(hash).or_default().push(offset);
    }

    pub fn get(&self, hash: u32) -> Option<&[u32]> {
        self.0.get(&hash).map(Vec::as_slice)
    }

    /// Number of distinct hashes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of (hash, offset) occurrences
    pub fn total_offsets(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.0.iter().map(|(&hash, offsets)| (hash, offsets.as_slice()))
    }

    /// Rows for indexing, ascending by hash.
    pub fn hash_rows(&self) -> Vec<HashRow> {
        self.iter()
            .flat_map(|(hash, offsets)| {
                offsets.iter().map(move |&time_offset| HashRow { hash, time_offset })
            })
            .collect()
    }

    /// Rows for a match query, most frequent hashes first (ties by hash).
    pub fn query_rows(&self) -> Vec<QueryRow> {
        let mut entries: Vec<(u32, &[u32])> = self.iter().collect();
        // Stable sort keeps ascending hash order within equal counts
        entries.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        entries
            .into_iter()
            .flat_map(|(input_hash, offsets)| {
                offsets.iter().map(move |&sample_time| QueryRow {
                    input_hash,
                    sample_time,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode_hash(1, 0, 0), 1 << 22);
        assert_eq!(encode_hash(0, 1, 0), 1 << 12);
        assert_eq!(encode_hash(0, 0, 1), 1);
        assert_eq!(encode_hash(1023, 1023, 4095), u32::MAX);
    }

    #[test]
    fn test_decode_recovers_in_range_values() {
        for &(f1, f2, dt) in &[(0, 0, 0), (93, 232, 17), (1023, 1, 200), (512, 1023, 4095)] {
            assert_eq!(decode_hash(encode_hash(f1, f2, dt)), (f1, f2, dt));
        }
    }

    #[test]
    fn test_out_of_range_values_alias() {
        // Bin 1024 wraps to 0
        assert_eq!(encode_hash(1024, 5, 9), encode_hash(0, 5, 9));
        assert_eq!(encode_hash(3, 2048 + 7, 9), encode_hash(3, 7, 9));
    }

    #[test]
    fn test_table_keeps_duplicates_in_order() {
        let mut table = HashTable::new();
        table.insert(9, 4);
        table.insert(2, 1);
        table.insert(9, 4);
        table.insert(9, 3);

        assert_eq!(table.len(), 2);
        assert_eq!(table.total_offsets(), 4);
        assert_eq!(table.get(9), Some(&[4, 4, 3][..]));
        assert_eq!(
            table.hash_rows(),
            vec![
                HashRow { hash: 2, time_offset: 1 },
                HashRow { hash: 9, time_offset: 4 },
                HashRow { hash: 9, time_offset: 4 },
                HashRow { hash: 9, time_offset: 3 },
            ]
        );
    }

    #[test]
    fn test_query_rows_most_frequent_first() {
        let mut table = HashTable::new();
        table.insert(5, 0);
        table.insert(7, 1);
        table.insert(7, 2);
        table.insert(3, 8);

        let hashes: Vec<u32> = table.query_rows().iter().map(|r| r.input_hash).collect();
        assert_eq!(hashes, vec![7, 7, 3, 5]);
    }

    #[test]
    fn test_json_is_ordered_by_hash() {
        let mut table = HashTable::new();
        table.insert(300, 1);
        table.insert(20, 2);
        assert_eq!(serde_json::to_string(&table).unwrap(), r#"{"20":[2],"300":[1]}"#);
    }
}
