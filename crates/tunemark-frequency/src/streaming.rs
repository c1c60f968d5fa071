//! Streaming ingest: fingerprint a track while it downloads.
//!
//! The controller accumulates raw s16le mono PCM from a [`StreamSource`] and
//! counts fixed-size chunks. Every few chunks it fingerprints everything
//! received so far and asks the catalog whether the track is already known.
//! A confident match stops the download early; otherwise the complete track
//! is fingerprinted and indexed once the stream ends.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tunemark_core::{MemoryCatalog, MemorySource, NewSong};
//! use tunemark_frequency::{Fingerprinter, StreamConfig, StreamController};
//!
//! let controller = StreamController::new(
//!     Arc::new(MemoryCatalog::new()),
//!     Arc::new(Fingerprinter::new()?),
//!     StreamConfig::default(),
//!     NewSong::new("Isibusiso"),
//! )?;
//! let outcome = controller.run(MemorySource::from_bytes(&pcm, 64 * 1024)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
use tunemark_core::catalog::{Catalog, DEFAULT_INSERT_BATCH};
use tunemark_core::source::{CancelToken, StreamSource};
use tunemark_core::{Error, MatchCandidate, NewSong, Result};

use crate::fingerprint::{analyze_blocking, Fingerprinter};
use crate::hash::HashTable;
use crate::indexing::{index_table, IndexedSong};
use crate::types::{AudioData, TARGET_SAMPLE_RATE};

/// Configuration for the streaming controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate of the incoming PCM, Hz
    pub sample_rate: u32,
    /// Chunk length used for preview cadence, seconds
    pub chunk_secs: u32,
    /// Run a preview match every this many chunks
    pub preview_every: usize,
    /// Top score at or above which the track counts as already indexed
    pub duplicate_score: f64,
    /// Hash rows per catalog insert
    pub insert_batch: usize,
    /// How long to wait for the source to stop after cancelling, ms
    pub cancel_grace_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            chunk_secs: 5,
            preview_every: 10,
            duplicate_score: 25.0,
            insert_batch: DEFAULT_INSERT_BATCH,
            cancel_grace_ms: 5_000,
        }
    }
}

impl StreamConfig {
    /// Bytes per chunk of 16-bit mono PCM
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_secs as usize * self.sample_rate as usize * 2
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.chunk_secs == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if self.preview_every == 0 {
            return Err(Error::InvalidConfig("preview_every must be positive".into()));
        }
        if self.insert_batch == 0 {
            return Err(Error::InvalidConfig("insert_batch must be positive".into()));
        }
        if !self.duplicate_score.is_finite() {
            return Err(Error::InvalidConfig("duplicate_score must be finite".into()));
        }
        Ok(())
    }
}

/// How a streamed track was handled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The track was new and has been indexed
    Indexed(IndexedSong),
    /// The catalog already holds this track; nothing was written
    AlreadyExists {
        candidate: MatchCandidate,
        /// Chunks consumed when the match was found
        chunks: usize,
    },
}

enum Read {
    Cancelled,
    Chunk(Result<Option<Bytes>>),
}

/// Drives the fingerprinting pipeline over one audio stream.
pub struct StreamController {
    catalog: Arc<dyn Catalog>,
    fingerprinter: Arc<Fingerprinter>,
    config: StreamConfig,
    song: NewSong,
    cancel: CancelToken,
}

impl StreamController {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fingerprinter: Arc<Fingerprinter>,
        config: StreamConfig,
        song: NewSong,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            fingerprinter,
            config,
            song,
            cancel: CancelToken::never(),
        })
    }

    /// Stop early when `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Consume `source` until it ends, a duplicate is found, or the run is
    /// cancelled.
    #[instrument(skip(self, source), fields(title = %self.song.title))]
    pub async fn run<S: StreamSource>(self, mut source: S) -> Result<IngestOutcome> {
        let chunk_bytes = self.config.chunk_bytes();
        let mut cancel = self.cancel.clone();
        let mut buffer: Vec<u8> = Vec::new();
        let mut next_preview = self.config.preview_every;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => Read::Cancelled,
                chunk = source.next_chunk() => Read::Chunk(chunk),
            };

            let bytes = match read {
                Read::Cancelled => {
                    info!(received = buffer.len(), "Ingest cancelled");
                    drop(buffer);
                    if let Err(e) = source.cancel(self.config.cancel_grace()).await {
                        warn!(error = %e, "Source did not stop cleanly");
                    }
                    return Err(Error::Cancelled);
                }
                Read::Chunk(Err(e)) => {
                    warn!(error = %e, received = buffer.len(), "Stream failed, discarding audio");
                    drop(buffer);
                    return Err(e);
                }
                Read::Chunk(Ok(None)) => break,
                Read::Chunk(Ok(Some(bytes))) => bytes,
            };

            buffer.extend_from_slice(&bytes);
            let chunks = buffer.len() / chunk_bytes;
            trace!(bytes = bytes.len(), chunks, "Chunk read");

            if chunks < next_preview {
                continue;
            }
            // One preview per read, however many boundaries it crossed
            next_preview = (chunks / self.config.preview_every + 1) * self.config.preview_every;

            match self.preview(&buffer).await {
                Ok(Some(candidate)) if candidate.score >= self.config.duplicate_score => {
                    info!(
                        song_id = %candidate.song_id,
                        score = candidate.score,
                        chunks,
                        "Track already indexed, stopping stream"
                    );
                    drop(buffer);
                    if let Err(e) = source.cancel(self.config.cancel_grace()).await {
                        warn!(error = %e, "Source did not stop cleanly");
                    }
                    return Ok(IngestOutcome::AlreadyExists { candidate, chunks });
                }
                Ok(best) => {
                    info!(
                        chunks,
                        best_score = best.as_ref().map(|c| c.score),
                        "Preview found no duplicate"
                    );
                }
                Err(e) => warn!(error = %e, chunks, "Preview match failed, continuing"),
            }
        }

        let chunks = buffer.len() / chunk_bytes;
        self.finish(buffer, chunks).await
    }

    /// Fingerprint what has arrived so far and return the top candidate.
    async fn preview(&self, buffer: &[u8]) -> Result<Option<MatchCandidate>> {
        let table = self.fingerprint(buffer).await?;
        self.best_match(&table).await
    }

    async fn finish(&self, buffer: Vec<u8>, chunks: usize) -> Result<IngestOutcome> {
        if buffer.len() < 2 {
            return Err(Error::invalid_input("stream produced no audio"));
        }

        let table = self.fingerprint(&buffer).await?;
        drop(buffer);

        if let Some(candidate) = self.best_match(&table).await? {
            if candidate.score >= self.config.duplicate_score {
                info!(
                    song_id = %candidate.song_id,
                    score = candidate.score,
                    "Track already indexed"
                );
                return Ok(IngestOutcome::AlreadyExists { candidate, chunks });
            }
        }

        let indexed = index_table(
            self.catalog.as_ref(),
            &table,
            &self.song,
            self.config.insert_batch,
        )
        .await?;
        Ok(IngestOutcome::Indexed(indexed))
    }

    async fn fingerprint(&self, pcm: &[u8]) -> Result<HashTable> {
        let audio = AudioData::from_s16le(pcm, self.config.sample_rate)?;
        let analysis = analyze_blocking(self.fingerprinter.clone(), audio).await?;
        debug!(
            peaks = analysis.peaks.len(),
            offsets = analysis.table.total_offsets(),
            "Fingerprinted stream buffer"
        );
        Ok(analysis.table)
    }

    async fn best_match(&self, table: &HashTable) -> Result<Option<MatchCandidate>> {
        if table.is_empty() {
            return Ok(None);
        }
        let candidates = self.catalog.match_hashes(&table.query_rows()).await?;
        Ok(candidates.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.chunk_bytes(), 441_000);
        assert_eq!(config.preview_every, 10);
        assert_eq!(config.duplicate_score, 25.0);
        assert_eq!(config.insert_batch, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = StreamConfig {
            preview_every: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_outcome_json() {
        let outcome = IngestOutcome::Indexed(IndexedSong {
            song_id: tunemark_core::SongId(4),
            hash_count: 12,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "indexed");
        assert_eq!(json["hash_count"], 12);
    }
}
