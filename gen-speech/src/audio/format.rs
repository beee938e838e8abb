//! Container detection from magic bytes.

use log::debug;

/// Smallest buffer accepted as a plausible audio clip.
pub const MIN_AUDIO_BYTES: usize = 100;

/// Audio containers recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Aac,
    Wav,
    Ogg,
    Flac,
    Mp4,
    WebM,
}

impl AudioFormat {
    /// Detect the container from the first bytes of a buffer.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"ID3") {
            Some(Self::Mp3)
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WAVE" {
            Some(Self::Wav)
        } else if data.starts_with(b"OggS") {
            Some(Self::Ogg)
        } else if data.starts_with(b"fLaC") {
            Some(Self::Flac)
        } else if data.len() >= 8 && &data[4..8] == b"ftyp" {
            Some(Self::Mp4)
        } else if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            Some(Self::WebM)
        } else if data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0 {
            // Frame sync. Layer bits of zero mean an ADTS (AAC) header.
            if data[1] & 0x06 == 0 {
                Some(Self::Aac)
            } else {
                Some(Self::Mp3)
            }
        } else {
            None
        }
    }

    /// File extension ffmpeg uses to pick the muxer.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Mp4 => "m4a",
            Self::WebM => "webm",
        }
    }
}

/// Sanity check an opaque audio buffer.
///
/// Buffers must be non-empty and at least [`MIN_AUDIO_BYTES`] long. An
/// unrecognised signature does not fail the check.
pub fn validate(buffer: &[u8]) -> bool {
    if buffer.len() < MIN_AUDIO_BYTES {
        debug!("Rejecting {}-byte audio buffer", buffer.len());
        return false;
    }

    match AudioFormat::detect(buffer) {
        Some(format) => debug!("Audio buffer looks like {:?}", format),
        None => debug!("Unrecognised audio signature, accepting anyway"),
    }

    true
}

/// Extension for a sequence of buffers, taken from the first one.
pub fn extension_for<B: AsRef<[u8]>>(buffers: &[B]) -> &'static str {
    buffers
        .first()
        .and_then(|b| AudioFormat::detect(b.as_ref()))
        .map(|f| f.extension())
        .unwrap_or("mp3")
}
