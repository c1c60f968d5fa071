//! Core types shared by the fingerprinting pipeline and catalog backends

use serde::{Deserialize, Serialize};

/// Catalog identifier of an indexed song
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(pub i64);

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata for a song about to be indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSong {
    pub title: String,
    /// Uploader or artist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Where the audio was fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl NewSong {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            channel: None,
            url: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// One stored hash occurrence: a hash and the anchor frame it was seen at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashRow {
    pub hash: u32,
    pub time_offset: u32,
}

/// One hash occurrence from a query clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRow {
    pub input_hash: u32,
    pub sample_time: u32,
}

/// Ranked result of a catalog match query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub song_id: SongId,
    pub title: String,
    #[serde(default)]
    pub channel: Option<String>,
    /// Opaque confidence; higher is better
    pub score: f64,
    /// Most common `db_time_offset - sample_time`, in frames
    pub time_diff: i64,
}
