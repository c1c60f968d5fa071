//! Catalog backed by a PostgREST service (the hosted Supabase layout).
//!
//! Tables `songs` and `audio_hashes`, plus the stored procedure
//! `match_audio(input_hashes)` which performs the offset-aligned vote.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use super::Catalog;
use crate::types::{HashRow, MatchCandidate, NewSong, QueryRow, SongId};
use crate::{Error, Result};

/// Connection settings for [`PostgrestCatalog`]
#[derive(Debug, Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve a path below `/rest/v1/`
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join("rest/v1/")
            .and_then(|rest| rest.join(path))
            .map_err(|e| Error::InvalidConfig(format!("bad catalog url: {}", e)))
    }
}

#[derive(Serialize)]
struct HashInsert {
    song_id: SongId,
    hash: i64,
    time_offset: u32,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    input_hashes: &'a [QueryRow],
}

#[derive(Deserialize)]
struct InsertedSong {
    id: SongId,
}

/// HTTP client for the hosted catalog
pub struct PostgrestCatalog {
    config: PostgrestConfig,
    client: Client,
}

impl PostgrestCatalog {
    pub fn new(config: PostgrestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&config.api_key)?);
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.api_key))?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &PostgrestConfig {
        &self.config
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::InvalidConfig("api key contains invalid header characters".into()))
}

/// Turn a non-success response into a storage error carrying the body
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::storage(format!("{} from catalog: {}", status, body)))
}

#[async_trait]
impl Catalog for PostgrestCatalog {
    #[instrument(skip(self, song), fields(title = %song.title))]
    async fn insert_song(&self, song: &NewSong) -> Result<SongId> {
        let response = self
            .client
            .post(self.config.endpoint("songs")?)
            .header("Prefer", "return=representation")
            .json(song)
            .send()
            .await?;

        let inserted: Vec<InsertedSong> = check_status(response).await?.json().await?;
        let id = inserted
            .first()
            .map(|row| row.id)
            .ok_or_else(|| Error::storage("song insert returned no rows"))?;

        info!(song_id = %id, "Song inserted");
        Ok(id)
    }

    async fn insert_hashes(&self, song_id: SongId, rows: &[HashRow]) -> Result<()> {
        let payload: Vec<HashInsert> = rows
            .iter()
            .map(|row| HashInsert {
                song_id,
                hash: row.hash as i64,
                time_offset: row.time_offset,
            })
            .collect();

        let response = self
            .client
            .post(self.config.endpoint("audio_hashes")?)
            .json(&payload)
            .send()
            .await?;
        check_status(response).await?;

        debug!(song_id = %song_id, rows = rows.len(), "Hash rows posted");
        Ok(())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn match_hashes(&self, rows: &[QueryRow]) -> Result<Vec<MatchCandidate>> {
        let response = self
            .client
            .post(self.config.endpoint("rpc/match_audio")?)
            .json(&MatchRequest { input_hashes: rows })
            .send()
            .await?;

        let candidates: Vec<MatchCandidate> = check_status(response).await?.json().await?;
        debug!(candidates = candidates.len(), "Match query answered");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> PostgrestConfig {
        PostgrestConfig::new(Url::parse(base).unwrap(), "anon-key")
    }

    #[test]
    fn test_endpoints_resolve_under_rest_v1() {
        let config = config("https://abc.supabase.co");
        assert_eq!(
            config.endpoint("songs").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/songs"
        );
        assert_eq!(
            config.endpoint("rpc/match_audio").unwrap().as_str(),
            "https://abc.supabase.co/rest/v1/rpc/match_audio"
        );
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let config = config("http://localhost:54321/proxy");
        assert_eq!(
            config.endpoint("audio_hashes").unwrap().as_str(),
            "http://localhost:54321/proxy/rest/v1/audio_hashes"
        );
    }

    #[test]
    fn test_match_request_body() {
        let rows = [QueryRow { input_hash: 7, sample_time: 3 }];
        let body = serde_json::to_value(MatchRequest { input_hashes: &rows }).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"input_hashes": [{"input_hash": 7, "sample_time": 3}]})
        );
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let base = Url::parse("https://abc.supabase.co").unwrap();
        let config = PostgrestConfig::new(base, "bad\nkey");
        assert!(matches!(
            PostgrestCatalog::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
