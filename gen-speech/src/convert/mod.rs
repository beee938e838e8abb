//! Conversion of a document's text into one stored audio file.
//!
//! Text is cleaned and chunked to the provider's limit, each chunk is
//! synthesized in order, and the clips are concatenated on a blocking
//! thread. Every conversion is persisted as a [`ConversionRecord`] and
//! tracked in a [`JobTracker`] while it runs.

pub mod jobs;

pub use jobs::{Job, JobTracker};

use crate::audio::{Concatenator, format};
use crate::storage::{ConversionRecord, Storage, conversion_id};
use crate::text::{Chunker, TextChunk, clean_text, validate_chunks};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tts_client::{SpeechOptions, TtsProvider, generate_with_retry};

/// Retries per chunk for retryable provider errors
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Called with the tracker's snapshot of the job after each chunk
pub type ProgressFn = Box<dyn Fn(&Job) + Send + Sync>;

/// Input to a conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub title: String,
    /// Input file name, for display
    pub source_file: String,
    pub text: String,
    pub options: SpeechOptions,
    /// Chunk size cap; the provider's limit applies regardless
    pub max_chunk_size: Option<usize>,
}

/// Chunk size actually used: the configured cap, never above the provider limit.
pub fn effective_chunk_size(configured: Option<usize>, provider_limit: usize) -> usize {
    configured.map_or(provider_limit, |size| size.min(provider_limit))
}

struct Synthesized {
    output_file: String,
    seconds: f64,
    exact: bool,
    degraded: bool,
}

/// Runs conversions against one provider.
pub struct Converter {
    provider: Arc<dyn TtsProvider>,
    storage: Arc<Storage>,
    jobs: JobTracker,
    concatenator: Concatenator,
    max_retries: u32,
    cancel: Arc<AtomicBool>,
    on_progress: Option<ProgressFn>,
}

impl Converter {
    pub fn new(
        provider: Arc<dyn TtsProvider>,
        storage: Arc<Storage>,
        jobs: JobTracker,
        concatenator: Concatenator,
    ) -> Self {
        Self {
            provider,
            storage,
            jobs,
            concatenator,
            max_retries: DEFAULT_MAX_RETRIES,
            cancel: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Flag that stops the conversion before its next chunk request.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Split a request's text the way [`Converter::convert`] will.
    pub fn plan(&self, request: &ConversionRequest) -> Result<Vec<TextChunk>> {
        let limit = effective_chunk_size(request.max_chunk_size, self.provider.max_chunk_size());
        let chunker = Chunker::new(limit)?;
        let chunks = chunker.chunks(&clean_text(&request.text));

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        if !validate_chunks(&texts, limit) {
            anyhow::bail!(
                "Chunking {} produced a chunk over the {} character limit",
                request.source_file,
                limit
            );
        }
        Ok(chunks)
    }

    /// Convert a request and store the result.
    ///
    /// On failure the stored record is marked failed and the job is moved
    /// to `Failed` before the error is returned. That includes failing to
    /// store the finished record.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionRecord> {
        let chunks = self.plan(&request)?;
        if chunks.is_empty() {
            anyhow::bail!("No text to convert in {}", request.source_file);
        }

        let id = conversion_id(&request.text, Utc::now());
        let mut record = ConversionRecord::new(
            id.clone(),
            request.title.clone(),
            request.source_file.clone(),
            self.provider.name().to_string(),
            request.options.voice.clone(),
            chunks.len(),
        );
        self.jobs.start(&id, chunks.len())?;

        info!(
            "Converting {} as {} ({} chunks via {})",
            request.source_file,
            id,
            chunks.len(),
            self.provider.name()
        );

        match self.run(&mut record, &chunks, &request.options).await {
            Ok(()) => {
                match self.jobs.complete(&id) {
                    Ok(job) => debug!("Job {} is {:?}", job.id, job.state),
                    Err(job_err) => warn!("{}", job_err),
                }
                info!(
                    "Conversion {} completed ({:.1}s of audio)",
                    id,
                    record.duration_seconds.unwrap_or_default()
                );
                Ok(record)
            }
            Err(e) => {
                record.mark_failed(format!("{:#}", e));
                if let Err(save_err) = self.storage.upsert(&record) {
                    warn!("Failed to record failure of {}: {:#}", id, save_err);
                }
                match self.jobs.fail(&id) {
                    Ok(job) => debug!("Job {} is {:?}", job.id, job.state),
                    Err(job_err) => warn!("{}", job_err),
                }
                Err(e)
            }
        }
    }

    /// Everything between starting the job and finishing it. Any error here
    /// leaves the job to be failed by the caller.
    async fn run(
        &self,
        record: &mut ConversionRecord,
        chunks: &[TextChunk],
        options: &SpeechOptions,
    ) -> Result<()> {
        self.storage.upsert(record)?;

        let done = self.synthesize(&record.id, chunks, options).await?;

        let mut completed = record.clone();
        completed.mark_completed(done.output_file, done.seconds, done.exact, done.degraded);
        self.storage
            .upsert(&completed)
            .with_context(|| format!("Failed to store completed conversion {}", completed.id))?;

        *record = completed;
        Ok(())
    }

    async fn synthesize(
        &self,
        id: &str,
        chunks: &[TextChunk],
        options: &SpeechOptions,
    ) -> Result<Synthesized> {
        let total = chunks.len();
        let mut buffers = Vec::with_capacity(total);

        for chunk in chunks {
            self.check_cancelled()?;

            debug!(
                "Synthesizing chunk {}/{} ({} chars)",
                chunk.index + 1,
                total,
                chunk.text.chars().count()
            );

            let audio = generate_with_retry(
                self.provider.as_ref(),
                &chunk.text,
                options,
                self.max_retries,
            )
            .await
            .with_context(|| format!("Chunk {}/{} failed", chunk.index + 1, total))?;

            if !format::validate(&audio) {
                anyhow::bail!(
                    "Provider returned invalid audio for chunk {}/{} ({} bytes)",
                    chunk.index + 1,
                    total,
                    audio.len()
                );
            }

            buffers.push(audio);
            self.jobs.set_progress(id, buffers.len())?;
            if let (Some(on_progress), Some(job)) = (&self.on_progress, self.jobs.get(id)) {
                on_progress(&job);
            }
        }

        // A cancel during the last request still discards its results
        self.check_cancelled()?;

        let concatenator = self.concatenator.clone();
        let (audio, outcome, duration, extension) = tokio::task::spawn_blocking(move || {
            let extension = format::extension_for(&buffers);
            let (audio, outcome) = concatenator.concatenate_to_vec(&buffers)?;
            let duration = concatenator.duration(&audio);
            Ok::<_, anyhow::Error>((audio, outcome, duration, extension))
        })
        .await
        .context("Task join error")??;

        let output_file = self.storage.save_audio(id, extension, &audio)?;

        Ok(Synthesized {
            output_file,
            seconds: duration.seconds,
            exact: duration.exact,
            degraded: outcome.degraded,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            anyhow::bail!("Conversion cancelled");
        }
        Ok(())
    }
}
