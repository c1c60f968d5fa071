//! Tunemark - landmark audio fingerprinting
//!
//! This crate turns PCM audio into compact hashes that survive re-encoding,
//! gain changes and background noise, and matches short recordings against
//! a catalog of indexed songs:
//! - **Spectrogram**: Hann-windowed STFT as log power spectral density
//! - **Constellation**: loud local maxima of the spectrogram
//! - **Fingerprints**: anchor/target peak pairs packed into 32-bit hashes
//! - **Streaming ingest**: incremental fingerprinting with early duplicate detection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   PCM / File    │───▶│   Spectrogram    │───▶│  Constellation  │
//! └─────────────────┘    └──────────────────┘    └────────┬────────┘
//!                                                         │
//!                                                         ▼
//!                        ┌──────────────────┐    ┌─────────────────┐
//!                        │    Hash Table    │◀───│   Peak Pairs    │
//!                        └────────┬─────────┘    └─────────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐       ┌───────────────┐
//! │    Index      │       │   Identify    │       │   Streaming   │
//! │ (insert rows) │       │ (match query) │       │  Controller   │
//! └───────────────┘       └───────────────┘       └───────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunemark_core::MemoryCatalog;
//! use tunemark_frequency::{identify_clip, AudioData, Fingerprinter, IdentifyPolicy};
//!
//! #[tokio::main]
//! async fn main() -> tunemark_core::Result<()> {
//!     let catalog = MemoryCatalog::load_or_default("catalog.json")?;
//!     let fingerprinter = Arc::new(Fingerprinter::new()?);
//!
//!     let recording = AudioData::new(vec![0.0; 44_100 * 10], 44_100);
//!     let policy = IdentifyPolicy::default();
//!     let outcome = identify_clip(&catalog, fingerprinter, recording, &policy).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod constellation;
pub mod fingerprint;
pub mod hash;
pub mod identify;
pub mod indexing;
pub mod pcm;
pub mod spectrogram;
pub mod streaming;
pub mod types;

#[cfg(feature = "decoder")]
pub mod decoder;

pub use constellation::ConstellationExtractor;
pub use fingerprint::{
    analyze_blocking, generate_fingerprints, ClipAnalysis, FingerprintConfig, Fingerprinter,
    FINGERPRINT_VERSION,
};
pub use hash::{decode_hash, encode_hash, HashTable};
pub use identify::{identify_clip, identify_table, IdentifyOutcome, IdentifyPolicy};
pub use indexing::{index_clip, index_table, IndexedSong};
pub use pcm::Sample;
pub use spectrogram::{Spectrogram, SpectrogramBuilder};
pub use streaming::{IngestOutcome, StreamConfig, StreamController};
pub use types::*;

#[cfg(feature = "decoder")]
pub use decoder::{AudioDecoder, DecodedAudio, Decoder};
