//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use tracing::{info, warn};
use tunemark_core::{
    cancel_pair, Catalog, CommandSource, MemoryCatalog, NewSong, PostgrestCatalog,
    PostgrestConfig,
};
use tunemark_frequency::decoder::{load_clip, AudioDecoder};
use tunemark_frequency::{
    analyze_blocking, identify_clip, index_clip, AudioData, Fingerprinter, IdentifyPolicy,
    IngestOutcome, StreamController, FINGERPRINT_VERSION,
};
use url::Url;

use crate::output;
use crate::settings::Settings;

/// Where songs and hashes are stored
#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    /// JSON snapshot used as a local catalog
    #[arg(long, global = true, default_value = "tunemark-catalog.json")]
    pub catalog: PathBuf,

    /// PostgREST base URL; takes precedence over the local snapshot
    #[arg(long, global = true, env = "TUNEMARK_REST_URL")]
    pub rest_url: Option<String>,

    /// API key sent with PostgREST requests
    #[arg(long, global = true, env = "TUNEMARK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// PostgREST request timeout, seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub rest_timeout_secs: u64,
}

/// Song metadata for indexing
#[derive(Args, Debug, Clone)]
pub struct SongArgs {
    /// Song title
    #[arg(short, long)]
    pub title: String,

    /// Uploader or artist channel
    #[arg(short, long)]
    pub channel: Option<String>,

    /// Source URL
    #[arg(short, long)]
    pub url: Option<String>,
}

impl From<SongArgs> for NewSong {
    fn from(args: SongArgs) -> Self {
        let mut song = NewSong::new(args.title);
        if let Some(channel) = args.channel {
            song = song.with_channel(channel);
        }
        if let Some(url) = args.url {
            song = song.with_url(url);
        }
        song
    }
}

/// An opened catalog backend
enum Backend {
    Snapshot {
        catalog: Arc<MemoryCatalog>,
        path: PathBuf,
    },
    Rest(Arc<PostgrestCatalog>),
}

impl Backend {
    fn open(args: &CatalogArgs) -> anyhow::Result<Self> {
        match &args.rest_url {
            Some(rest_url) => {
                let Some(api_key) = &args.api_key else {
                    bail!("--api-key (or TUNEMARK_API_KEY) is required with --rest-url");
                };
                let base_url = Url::parse(rest_url).context("invalid --rest-url")?;
                let config = PostgrestConfig::new(base_url, api_key.clone())
                    .with_timeout(Duration::from_secs(args.rest_timeout_secs));
                let catalog = PostgrestCatalog::new(config)?;
                info!(url = %rest_url, "Using PostgREST catalog");
                Ok(Backend::Rest(Arc::new(catalog)))
            }
            None => {
                let catalog = MemoryCatalog::load_or_default(&args.catalog)
                    .with_context(|| format!("loading catalog {}", args.catalog.display()))?;
                info!(
                    path = %args.catalog.display(),
                    songs = catalog.song_count(),
                    "Using local catalog"
                );
                Ok(Backend::Snapshot {
                    catalog: Arc::new(catalog),
                    path: args.catalog.clone(),
                })
            }
        }
    }

    fn catalog(&self) -> Arc<dyn Catalog> {
        match self {
            Backend::Snapshot { catalog, .. } => catalog.clone() as Arc<dyn Catalog>,
            Backend::Rest(catalog) => catalog.clone() as Arc<dyn Catalog>,
        }
    }

    /// Write the local snapshot back; remote catalogs commit as they go
    fn persist(&self) -> anyhow::Result<()> {
        if let Backend::Snapshot { catalog, path } = self {
            catalog
                .save(path)
                .with_context(|| format!("saving catalog {}", path.display()))?;
        }
        Ok(())
    }
}

/// Read, decode and prepare an audio file off the async runtime.
async fn load_audio(input: &Path) -> anyhow::Result<AudioData> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let audio =
        tokio::task::spawn_blocking(move || load_clip(&AudioDecoder, &bytes)).await??;
    Ok(audio)
}

fn fingerprinter(settings: &Settings) -> anyhow::Result<Arc<Fingerprinter>> {
    Ok(Arc::new(Fingerprinter::with_config(settings.fingerprint.clone())?))
}

/// Fingerprint a file and report what each stage produced
pub async fn fingerprint(
    input: &Path,
    json: bool,
    output_path: Option<PathBuf>,
    settings: &Settings,
) -> anyhow::Result<()> {
    println!("Fingerprinting: {}", input.display());

    let audio = load_audio(input).await?;
    let duration_secs = audio.duration_secs();
    let analysis = analyze_blocking(fingerprinter(settings)?, audio).await?;

    println!("\nFingerprint:");
    println!("  Version: {}", FINGERPRINT_VERSION);
    println!("  Duration: {:.2}s", duration_secs);
    println!("  Spectrogram: {} bins x {} frames", analysis.bins, analysis.frames);
    println!("  Peaks: {}", analysis.peaks.len());
    println!("  Peak pairs: {}", analysis.fingerprint_count);
    println!("  Distinct hashes: {}", analysis.table.len());

    let dump = serde_json::json!({
        "version": FINGERPRINT_VERSION,
        "duration_secs": duration_secs,
        "peaks": analysis.peaks.len(),
        "hashes": analysis.table,
    });

    if json {
        println!("\n{}", output::to_json(&dump)?);
    }
    if let Some(path) = output_path {
        std::fs::write(&path, output::to_json(&dump)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("\nSaved to: {}", path.display());
    }

    Ok(())
}

/// Fingerprint a file and add it to the catalog
pub async fn index(
    input: &Path,
    song: SongArgs,
    catalog: &CatalogArgs,
    settings: &Settings,
) -> anyhow::Result<()> {
    let backend = Backend::open(catalog)?;
    let song = NewSong::from(song);
    println!("Indexing: {} as \"{}\"", input.display(), song.title);

    let audio = load_audio(input).await?;
    let indexed = index_clip(
        backend.catalog().as_ref(),
        fingerprinter(settings)?,
        audio,
        &song,
        settings.stream.insert_batch,
    )
    .await?;
    backend.persist()?;

    println!("\nIndexed:");
    println!("  Song ID: {}", indexed.song_id);
    println!("  Hash rows: {}", indexed.hash_count);
    Ok(())
}

/// Identify a recording
pub async fn identify(
    input: &Path,
    policy: &IdentifyPolicy,
    json: bool,
    catalog: &CatalogArgs,
    settings: &Settings,
) -> anyhow::Result<()> {
    let backend = Backend::open(catalog)?;
    let audio = load_audio(input).await?;

    let outcome = identify_clip(
        backend.catalog().as_ref(),
        fingerprinter(settings)?,
        audio,
        policy,
    )
    .await?;

    if json {
        println!("{}", output::to_json(&outcome)?);
    } else {
        println!("{}", output::describe_outcome(&outcome));
    }
    Ok(())
}

/// Stream PCM from a child process through the match controller
pub async fn ingest(
    song: SongArgs,
    command: &[String],
    catalog: &CatalogArgs,
    settings: &Settings,
) -> anyhow::Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command given");
    };
    let backend = Backend::open(catalog)?;
    let song = NewSong::from(song);

    println!(
        "Ingesting \"{}\" from `{}` (s16le mono {} Hz expected)",
        song.title,
        command.join(" "),
        settings.stream.sample_rate
    );

    let source = CommandSource::spawn(program, args)?;
    let (handle, token) = cancel_pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping stream");
            handle.cancel();
        }
    });

    let controller = StreamController::new(
        backend.catalog(),
        fingerprinter(settings)?,
        settings.stream.clone(),
        song,
    )?
    .with_cancel(token);
    let result = controller.run(source).await;
    interrupt.abort();

    match result? {
        IngestOutcome::Indexed(indexed) => {
            backend.persist()?;
            println!("\nIndexed:");
            println!("  Song ID: {}", indexed.song_id);
            println!("  Hash rows: {}", indexed.hash_count);
        }
        IngestOutcome::AlreadyExists { candidate, chunks } => {
            println!("\nAlready indexed (stopped after {} chunks):", chunks);
            println!("{}", output::candidate_table(std::slice::from_ref(&candidate)));
        }
    }
    Ok(())
}
