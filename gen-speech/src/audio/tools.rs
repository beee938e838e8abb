//! Location and invocation of the external ffmpeg/ffprobe binaries.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Paths of the audio tools usable in this environment.
///
/// Either tool may be missing; callers fall back accordingly.
#[derive(Debug, Clone, Default)]
pub struct AudioTools {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
}

impl AudioTools {
    /// Locate ffmpeg and ffprobe, preferring configured paths over `PATH`.
    pub fn locate(ffmpeg_path: Option<&Path>, ffprobe_path: Option<&Path>) -> Self {
        let tools = Self {
            ffmpeg: resolve("ffmpeg", ffmpeg_path),
            ffprobe: resolve("ffprobe", ffprobe_path),
        };
        debug!(
            "Audio tools: ffmpeg={:?} ffprobe={:?}",
            tools.ffmpeg, tools.ffprobe
        );
        tools
    }

    /// No external tools; every operation takes its fallback path.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ffmpeg(&self) -> Option<&Path> {
        self.ffmpeg.as_deref()
    }

    pub fn ffprobe(&self) -> Option<&Path> {
        self.ffprobe.as_deref()
    }

    /// Duration of an audio file in seconds, as reported by ffprobe.
    pub fn probe_duration(&self, audio_path: &Path) -> Result<f64> {
        let ffprobe = self
            .ffprobe()
            .ok_or_else(|| anyhow::anyhow!("ffprobe is not available"))?;

        let output = Command::new(ffprobe)
            .args([
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(audio_path)
            .output()
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed: {}", stderr);
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse duration {:?}", duration_str.trim()))
    }
}

/// Find a working binary: the configured path if given, else `PATH`.
fn resolve(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    let candidate = match configured {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            debug!("Configured {} not found at {}", name, path.display());
            None
        }
        None => which::which(name).ok(),
    }?;

    if is_runnable(&candidate) {
        Some(candidate)
    } else {
        debug!("{} at {} does not run", name, candidate.display());
        None
    }
}

fn is_runnable(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
