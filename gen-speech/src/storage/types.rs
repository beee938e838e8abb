//! Conversion metadata persisted by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a conversion stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.pad(s)
    }
}

/// One text-to-speech conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: String,
    pub title: String,
    /// Name of the input file, without directories
    pub source_file: String,
    pub provider: String,
    #[serde(default)]
    pub voice: Option<String>,
    pub status: ConversionStatus,
    #[serde(default)]
    pub chunk_count: usize,
    /// Audio file name inside the store's audio directory
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    /// False when the duration was estimated from the file size
    #[serde(default)]
    pub duration_exact: bool,
    /// Audio was joined without ffmpeg
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionRecord {
    /// Create a record in the processing state.
    pub fn new(
        id: String,
        title: String,
        source_file: String,
        provider: String,
        voice: Option<String>,
        chunk_count: usize,
    ) -> Self {
        let now = Utc::now();

        Self {
            id,
            title,
            source_file,
            provider,
            voice,
            status: ConversionStatus::Processing,
            chunk_count,
            output_file: None,
            duration_seconds: None,
            duration_exact: false,
            degraded: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark this conversion as completed with its audio file.
    pub fn mark_completed(
        &mut self,
        output_file: String,
        duration_seconds: f64,
        duration_exact: bool,
        degraded: bool,
    ) {
        self.status = ConversionStatus::Completed;
        self.output_file = Some(output_file);
        self.duration_seconds = Some(duration_seconds);
        self.duration_exact = duration_exact;
        self.degraded = degraded;
        self.error = None;
        self.updated_at = Utc::now();
    }

    /// Mark this conversion as failed with the given error.
    pub fn mark_failed(&mut self, error: String) {
        self.status = ConversionStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}
