//! gen-speech - Convert text documents to speech using hosted TTS providers

mod audio;
mod config;
mod convert;
mod document;
mod storage;
mod text;

use anyhow::{Context, Result};
use audio::{AudioTools, ConcatOutcome, Concatenator};
use clap::{Parser, Subcommand};
use config::GenSpeechConfig;
use convert::{ConversionRequest, Converter, Job, JobTracker};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use storage::{ConversionRecord, ConversionStatus, Storage};
use text::{Chunker, DEFAULT_MAX_CHUNK_SIZE, chunk_text, clean_text, validate_chunks};
use tts_client::{MockProvider, ProviderKind, SpeechOptions, TtsProvider, get_provider};

#[derive(Parser, Debug)]
#[command(name = "gen-speech")]
#[command(about = "Convert text documents to speech using hosted TTS providers", long_about = None)]
#[command(version)]
struct Args {
    /// Enable debug output
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a document (.txt, .md, .html, .epub) to speech
    Convert {
        /// Path to the document
        file: PathBuf,

        /// Also write the audio here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Provider (openai, elevenlabs, mock)
        #[arg(long)]
        provider: Option<String>,

        /// Voice name or id
        #[arg(long)]
        voice: Option<String>,

        /// Model id
        #[arg(long)]
        model: Option<String>,

        /// Playback speed (0.25-4.0)
        #[arg(long)]
        speed: Option<f32>,

        /// Chunk size cap in characters
        #[arg(long)]
        max_chunk_size: Option<usize>,

        /// Synthesize silence with the offline mock provider instead
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Show how a document would be split
    Chunk {
        /// Path to the document
        file: PathBuf,

        /// Chunk size limit in characters
        #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_SIZE)]
        max_chunk_size: usize,

        /// Print statistics instead of the chunks
        #[arg(long, default_value_t = false)]
        stats: bool,
    },
    /// Concatenate audio files into one
    Concat {
        /// Output file
        output: PathBuf,

        /// Input files, in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// List stored conversions
    List,
    /// Show a stored conversion
    Show {
        id: String,
    },
    /// Delete a stored conversion and its audio
    Delete {
        id: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default provider
    SetProvider {
        /// Provider name (openai, elevenlabs, mock)
        name: String,
    },
    /// Set default voice
    SetVoice {
        /// Voice name or id
        voice: String,
    },
    /// Set default chunk size cap
    SetMaxChunkSize {
        /// Size in characters
        size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = GenSpeechConfig::load().context("Failed to load configuration")?;

    match args.command {
        Commands::Convert {
            file,
            output,
            provider,
            voice,
            model,
            speed,
            max_chunk_size,
            dry_run,
        } => {
            let options = speech_options(&config, voice, model, speed);
            let provider = build_provider(&config, provider.as_deref(), dry_run)?;
            let max_chunk_size = max_chunk_size.or(config.max_chunk_size);
            run_convert(&config, &file, output.as_deref(), provider, options, max_chunk_size).await
        }
        Commands::Chunk {
            file,
            max_chunk_size,
            stats,
        } => run_chunk(&file, max_chunk_size, stats),
        Commands::Concat { output, inputs } => run_concat(&config, &output, &inputs),
        Commands::List => run_list(&open_storage(&config)?),
        Commands::Show { id } => run_show(&open_storage(&config)?, &id),
        Commands::Delete { id } => {
            let storage = open_storage(&config)?;
            if !storage.remove(&id)? {
                anyhow::bail!("No conversion with id {}", id);
            }
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::Config { action } => handle_config_command(&action),
    }
}

/// Log to stderr at info, or debug with `--debug`; `RUST_LOG` overrides both.
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn open_storage(config: &GenSpeechConfig) -> Result<Storage> {
    let data_dir = config.data_dir()?;
    Storage::open(&data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))
}

fn audio_tools(config: &GenSpeechConfig) -> AudioTools {
    AudioTools::locate(config.ffmpeg_path.as_deref(), config.ffprobe_path.as_deref())
}

fn speech_options(
    config: &GenSpeechConfig,
    voice: Option<String>,
    model: Option<String>,
    speed: Option<f32>,
) -> SpeechOptions {
    let mut options = SpeechOptions::new();
    if let Some(voice) = voice.or_else(|| config.voice.clone()) {
        options = options.with_voice(voice);
    }
    if let Some(model) = model.or_else(|| config.model.clone()) {
        options = options.with_model(model);
    }
    if let Some(speed) = speed {
        options = options.with_speed(speed);
    }
    options
}

fn build_provider(
    config: &GenSpeechConfig,
    name: Option<&str>,
    dry_run: bool,
) -> Result<Arc<dyn TtsProvider>> {
    let kind = config.provider_kind(name)?;

    if dry_run {
        info!("Dry run: using mock provider instead of {}", kind.as_str());
        let mut provider = MockProvider::always_succeeds();
        if let Some(limit) = config.provider_config(kind).and_then(|p| p.max_chunk_size) {
            provider = provider.with_max_chunk_size(limit);
        }
        return Ok(Arc::new(provider));
    }

    let provider = get_provider(kind, config.provider_config(kind))?;
    Ok(Arc::from(provider))
}

async fn run_convert(
    config: &GenSpeechConfig,
    file: &Path,
    output: Option<&Path>,
    provider: Arc<dyn TtsProvider>,
    options: SpeechOptions,
    max_chunk_size: Option<usize>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let document = document::load_document(file)?;
    let storage = Arc::new(open_storage(config)?);
    let concatenator = Concatenator::new(audio_tools(config), storage.work_dir());

    let request = ConversionRequest {
        title: document.title,
        source_file: file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        text: document.text,
        options,
        max_chunk_size,
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let jobs = JobTracker::new();
    let bar = pb.clone();
    let converter = Converter::new(provider, Arc::clone(&storage), jobs.clone(), concatenator)
        .with_max_retries(config.max_retries)
        .with_progress(Box::new(move |job: &Job| {
            bar.set_length(job.total_chunks as u64);
            bar.set_position(job.completed_chunks as u64);
            bar.set_message(format!("{:.0}%", job.progress()));
        }));

    let cancel = converter.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            for job in jobs.active() {
                warn!(
                    "Interrupted, stopping {} after chunk {}/{}",
                    job.id,
                    job.completed_chunks + 1,
                    job.total_chunks
                );
            }
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let record = match converter.convert(request).await {
        Ok(record) => {
            pb.finish_with_message("done");
            record
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e);
        }
    };

    let audio_path = storage
        .audio_path(&record)
        .ok_or_else(|| anyhow::anyhow!("Conversion {} has no audio file", record.id))?;

    if record.degraded {
        eprintln!("Warning: ffmpeg not found, audio was joined without re-muxing");
    }

    if let Some(output) = output {
        fs::copy(&audio_path, output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        eprintln!("Output: {}", output.display());
    }

    print_record(&record, Some(audio_path.as_path()));
    Ok(())
}

fn run_chunk(file: &Path, max_chunk_size: usize, stats: bool) -> Result<()> {
    let document = document::load_document(file)?;
    let chunker = Chunker::new(max_chunk_size)?;
    let text = clean_text(&document.text);

    if stats {
        let stats = chunker.stats(&text);
        println!("Title: {}", document.title);
        println!("Characters: {}", stats.total_length);
        println!("Chunks: {}", stats.chunk_count);
        println!(
            "Chunk length: min {}, avg {:.1}, max {} (limit {}, packed to {})",
            stats.min_length,
            stats.avg_length,
            stats.max_length,
            chunker.max_chunk_size(),
            chunker.safe_chunk_size()
        );
        return Ok(());
    }

    let chunks = chunk_text(&text, max_chunk_size)?;
    if !validate_chunks(&chunks, max_chunk_size) {
        anyhow::bail!("Chunking produced a chunk over {} characters", max_chunk_size);
    }

    for (index, chunk) in chunks.iter().enumerate() {
        println!("--- chunk {} ({} chars) ---", index + 1, chunk.chars().count());
        println!("{}", chunk);
    }
    Ok(())
}

fn run_concat(config: &GenSpeechConfig, output: &Path, inputs: &[PathBuf]) -> Result<()> {
    let buffers = inputs
        .iter()
        .map(|path| fs::read(path).with_context(|| format!("Failed to read {}", path.display())))
        .collect::<Result<Vec<_>>>()?;

    let storage = open_storage(config)?;
    let concatenator = Concatenator::new(audio_tools(config), storage.work_dir());

    let outcome = write_concatenated(&concatenator, &buffers, output)?;

    let duration = concatenator.duration(&fs::read(output)?);
    eprintln!(
        "Output: {} ({} bytes, {}{:.1}s{})",
        output.display(),
        outcome.bytes_written,
        if duration.exact { "" } else { "~" },
        duration.seconds,
        if outcome.degraded { ", joined without ffmpeg" } else { "" }
    );
    Ok(())
}

/// Concatenate into a temporary file beside `output` and move it into place,
/// so a failed run never leaves a partial or empty `output`.
fn write_concatenated(
    concatenator: &Concatenator,
    buffers: &[Vec<u8>],
    output: &Path,
) -> Result<ConcatOutcome> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;

    let mut writer = BufWriter::new(tmp);
    let outcome = concatenator.concatenate(buffers, &mut writer)?;
    writer.flush()?;

    let tmp = writer.into_inner().map_err(|e| e.into_error())?;
    tmp.persist(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(outcome)
}

fn run_list(storage: &Storage) -> Result<()> {
    let records = storage.list()?;
    if records.is_empty() {
        println!("No conversions yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {:<10}  {:>4} chunks  {:>8}  {}",
            record.id,
            record.status,
            record.chunk_count,
            format_duration(&record),
            record.title
        );
    }
    Ok(())
}

fn run_show(storage: &Storage, id: &str) -> Result<()> {
    let record = storage
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("No conversion with id {}", id))?;
    let audio_path = storage.audio_path(&record);
    print_record(&record, audio_path.as_deref());
    Ok(())
}

fn print_record(record: &ConversionRecord, audio_path: Option<&Path>) {
    println!("ID: {}", record.id);
    println!("Title: {}", record.title);
    println!("Source: {}", record.source_file);
    println!("Provider: {}", record.provider);
    if let Some(voice) = &record.voice {
        println!("Voice: {}", voice);
    }
    println!("Status: {}", record.status);
    println!("Chunks: {}", record.chunk_count);
    if record.status == ConversionStatus::Completed {
        println!("Duration: {}", format_duration(record));
    }
    if let Some(path) = audio_path {
        println!("Audio: {}", path.display());
    }
    if let Some(error) = &record.error {
        println!("Error: {}", error);
    }
    println!("Created: {}", record.created_at.to_rfc3339());
}

fn format_duration(record: &ConversionRecord) -> String {
    match record.duration_seconds {
        Some(seconds) => {
            let total = seconds.round() as u64;
            let approx = if record.duration_exact { "" } else { "~" };
            format!("{}{}:{:02}", approx, total / 60, total % 60)
        }
        None => "-".to_string(),
    }
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = GenSpeechConfig::load()?;
            println!("Configuration file: {:?}", GenSpeechConfig::config_path()?);
            println!();
            println!("provider = \"{}\"", config.provider);
            match &config.voice {
                Some(voice) => println!("voice = \"{}\"", voice),
                None => println!("voice = (provider default)"),
            }
            match &config.model {
                Some(model) => println!("model = \"{}\"", model),
                None => println!("model = (provider default)"),
            }
            match config.max_chunk_size {
                Some(size) => println!("max_chunk_size = {}", size),
                None => println!("max_chunk_size = (provider limit)"),
            }
            println!("max_retries = {}", config.max_retries);
            println!("data_dir = \"{}\"", config.data_dir()?.display());
            let tools = audio_tools(&config);
            match tools.ffmpeg() {
                Some(path) => println!("ffmpeg = \"{}\"", path.display()),
                None => println!("ffmpeg = (not found)"),
            }
            match tools.ffprobe() {
                Some(path) => println!("ffprobe = \"{}\"", path.display()),
                None => println!("ffprobe = (not found)"),
            }
            for (name, provider) in &config.providers {
                let key = if provider.api_key.is_some() { "set" } else { "(env)" };
                println!("[providers.{}] api_key = {}", name, key);
            }
        }
        ConfigAction::SetProvider { name } => {
            let kind = ProviderKind::from_str(name)?;
            let mut config = GenSpeechConfig::load()?;
            config.provider = kind.as_str().to_string();
            config.save()?;
            println!("Default provider set to: {}", config.provider);
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = GenSpeechConfig::load()?;
            config.voice = Some(voice.clone());
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetMaxChunkSize { size } => {
            if *size == 0 {
                anyhow::bail!("Chunk size must be positive");
            }
            let mut config = GenSpeechConfig::load()?;
            config.max_chunk_size = Some(*size);
            config.save()?;
            println!("Default max chunk size set to: {}", size);
        }
    }
    Ok(())
}
