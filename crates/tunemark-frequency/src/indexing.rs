//! Committing a fingerprinted clip to the catalog.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use tunemark_core::catalog::{insert_hashes_batched, Catalog};
use tunemark_core::{Error, NewSong, Result, SongId};

use crate::fingerprint::{analyze_blocking, Fingerprinter};
use crate::hash::HashTable;
use crate::types::AudioData;

/// A song created by indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexedSong {
    pub song_id: SongId,
    /// Number of (hash, offset) rows inserted
    pub hash_count: usize,
}

/// Insert `song` and every row of `table`.
///
/// An empty table is rejected before anything is written. Hash rows need the
/// id assigned by `insert_song`, so a failing `insert_hashes` leaves the song
/// record behind with fewer rows than the table holds; [`Catalog`] has no
/// delete to roll it back. The storage error is returned unretried.
#[instrument(skip(catalog, table, song), fields(title = %song.title))]
pub async fn index_table(
    catalog: &dyn Catalog,
    table: &HashTable,
    song: &NewSong,
    batch_size: usize,
) -> Result<IndexedSong> {
    if table.is_empty() {
        return Err(Error::invalid_input("clip produced no fingerprints"));
    }
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch size must be positive".into()));
    }

    let rows = table.hash_rows();
    let song_id = catalog.insert_song(song).await?;
    let hash_count = insert_hashes_batched(catalog, song_id, &rows, batch_size).await?;

    info!(song_id = %song_id, hash_count, "Song indexed");
    Ok(IndexedSong {
        song_id,
        hash_count,
    })
}

/// Fingerprint a whole clip and index it.
pub async fn index_clip(
    catalog: &dyn Catalog,
    fingerprinter: Arc<Fingerprinter>,
    audio: AudioData,
    song: &NewSong,
    batch_size: usize,
) -> Result<IndexedSong> {
    let analysis = analyze_blocking(fingerprinter, audio).await?;
    index_table(catalog, &analysis.table, song, batch_size).await
}
