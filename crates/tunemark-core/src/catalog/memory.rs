//! In-process catalog with offset-alignment voting.
//!
//! Used by the CLI (persisted as a JSON snapshot) and by tests. Matching
//! follows the same rule the hosted `match_audio` procedure applies: a song's
//! score is the number of query hashes that agree on its single most common
//! `db_time_offset - sample_time`.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::Catalog;
use crate::types::{HashRow, MatchCandidate, NewSong, QueryRow, SongId};
use crate::{Error, Result};

/// A song as stored by [`MemoryCatalog`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSong {
    pub id: SongId,
    pub title: String,
    pub channel: Option<String>,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub hash_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Occurrence {
    song_id: SongId,
    time_offset: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    songs: Vec<StoredSong>,
    buckets: BTreeMap<u32, Vec<Occurrence>>,
}

impl CatalogState {
    fn song_mut(&mut self, id: SongId) -> Option<&mut StoredSong> {
        self.songs
            .binary_search_by_key(&id, |song| song.id)
            .ok()
            .map(|index| &mut self.songs[index])
    }
}

/// Catalog held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryCatalog::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let state: CatalogState = serde_json::from_reader(reader)?;

        info!(
            path = %path.display(),
            songs = state.songs.len(),
            buckets = state.buckets.len(),
            "Catalog snapshot loaded"
        );

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Load a snapshot if it exists, otherwise start empty
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Write the catalog to `path`, replacing any previous snapshot
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let staging = path.with_extension("tmp");

        {
            let state = self.read()?;
            let mut writer = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer(&mut writer, &*state)?;
            std::io::Write::flush(&mut writer)?;
        }
        std::fs::rename(&staging, path)?;

        debug!(path = %path.display(), "Catalog snapshot saved");
        Ok(())
    }

    /// Number of indexed songs
    pub fn song_count(&self) -> usize {
        self.read().map(|state| state.songs.len()).unwrap_or(0)
    }

    /// Total stored (hash, offset) rows
    pub fn hash_row_count(&self) -> usize {
        self.read()
            .map(|state| state.buckets.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Look up a song record
    pub fn song(&self, id: SongId) -> Option<StoredSong> {
        let state = self.read().ok()?;
        state
            .songs
            .binary_search_by_key(&id, |song| song.id)
            .ok()
            .map(|index| state.songs[index].clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CatalogState>> {
        self.state
            .read()
            .map_err(|_| Error::Internal("catalog lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CatalogState>> {
        self.state
            .write()
            .map_err(|_| Error::Internal("catalog lock poisoned".into()))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    #[instrument(skip(self, song), fields(title = %song.title))]
    async fn insert_song(&self, song: &NewSong) -> Result<SongId> {
        let mut state = self.write()?;
        let id = SongId(state.songs.last().map(|s| s.id.0 + 1).unwrap_or(1));

        state.songs.push(StoredSong {
            id,
            title: song.title.clone(),
            channel: song.channel.clone(),
            url: song.url.clone(),
            created_at: Utc::now(),
            hash_count: 0,
        });

        info!(song_id = %id, "Song inserted");
        Ok(id)
    }

    async fn insert_hashes(&self, song_id: SongId, rows: &[HashRow]) -> Result<()> {
        let mut state = self.write()?;

        let song = state
            .song_mut(song_id)
            .ok_or_else(|| Error::storage(format!("unknown song id {}", song_id)))?;
        song.hash_count += rows.len();

        for row in rows {
            state.buckets.entry(row.hash).or_default().push(Occurrence {
                song_id,
                time_offset: row.time_offset,
            });
        }

        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn match_hashes(&self, rows: &[QueryRow]) -> Result<Vec<MatchCandidate>> {
        let state = self.read()?;

        // song -> (offset -> votes)
        let mut votes: HashMap<SongId, HashMap<i64, u32>> = HashMap::new();
        for row in rows {
            let Some(occurrences) = state.buckets.get(&row.input_hash) else {
                continue;
            };
            for occurrence in occurrences {
                let offset = occurrence.time_offset as i64 - row.sample_time as i64;
                *votes
                    .entry(occurrence.song_id)
                    .or_default()
                    .entry(offset)
                    .or_default() += 1;
            }
        }

        let mut candidates: Vec<MatchCandidate> = votes
            .into_iter()
            .filter_map(|(song_id, offsets)| {
                let (time_diff, count) = offsets
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;
                let index = state
                    .songs
                    .binary_search_by_key(&song_id, |song| song.id)
                    .ok()?;
                let song = &state.songs[index];

                Some(MatchCandidate {
                    song_id,
                    title: song.title.clone(),
                    channel: song.channel.clone(),
                    score: count as f64,
                    time_diff,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.song_id.cmp(&b.song_id))
        });

        debug!(candidates = candidates.len(), "Match query answered");
        Ok(candidates)
    }
}
