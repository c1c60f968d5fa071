//! Catalog interface: song records, hash buckets and the match query.
//!
//! The catalog owns everything that outlives a single clip. Fingerprinting
//! code only ever talks to it through [`Catalog`], so backends can be swapped
//! at the process entry point.

mod memory;
mod postgrest;

pub use memory::MemoryCatalog;
pub use postgrest::{PostgrestCatalog, PostgrestConfig};

use async_trait::async_trait;
use tracing::debug;

use crate::types::{HashRow, MatchCandidate, NewSong, QueryRow, SongId};
use crate::{Error, Result};

/// Default number of hash rows per `insert_hashes` call
pub const DEFAULT_INSERT_BATCH: usize = 1000;

/// Storage and match service for indexed songs.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create a song record and return its id.
    async fn insert_song(&self, song: &NewSong) -> Result<SongId>;

    /// Append hash occurrences for a song.
    async fn insert_hashes(&self, song_id: SongId, rows: &[HashRow]) -> Result<()>;

    /// Rank songs by offset-aligned hash agreement, best first.
    async fn match_hashes(&self, rows: &[QueryRow]) -> Result<Vec<MatchCandidate>>;
}

/// Insert `rows` in batches of at most `batch_size`, returning the row count.
pub async fn insert_hashes_batched(
    catalog: &dyn Catalog,
    song_id: SongId,
    rows: &[HashRow],
    batch_size: usize,
) -> Result<usize> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch size must be positive".into()));
    }

    for (index, batch) in rows.chunks(batch_size).enumerate() {
        catalog.insert_hashes(song_id, batch).await?;
        debug!(song_id = %song_id, batch = index, rows = batch.len(), "Inserted hash batch");
    }

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCatalog {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Catalog for RecordingCatalog {
        async fn insert_song(&self, _song: &NewSong) -> Result<SongId> {
            Ok(SongId(1))
        }

        async fn insert_hashes(&self, _song_id: SongId, rows: &[HashRow]) -> Result<()> {
            self.batches.lock().unwrap().push(rows.len());
            Ok(())
        }

        async fn match_hashes(&self, _rows: &[QueryRow]) -> Result<Vec<MatchCandidate>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_batched_insert_splits_rows() {
        let catalog = RecordingCatalog::default();
        let rows: Vec<HashRow> = (0..2500)
            .map(|i| HashRow { hash: i, time_offset: i })
            .collect();

        let inserted = insert_hashes_batched(&catalog, SongId(1), &rows, 1000)
            .await
            .unwrap();

        assert_eq!(inserted, 2500);
        assert_eq!(*catalog.batches.lock().unwrap(), vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn test_batched_insert_rejects_zero_batch() {
        let catalog = RecordingCatalog::default();
        let err = insert_hashes_batched(&catalog, SongId(1), &[], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
