//! Persistent storage for conversions and their audio.

mod store;
mod types;

pub use store::{Storage, conversion_id};
pub use types::{ConversionRecord, ConversionStatus};

use anyhow::Result;
use std::path::PathBuf;

/// Default data directory: `<local data dir>/gen-speech`.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("gen-speech"))
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))
}
