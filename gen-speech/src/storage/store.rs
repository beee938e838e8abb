//! On-disk store for conversion records and their audio.

use super::types::ConversionRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const INDEX_FILE: &str = "conversions.json";
const AUDIO_DIR: &str = "audio";
const WORK_DIR: &str = "work";

/// Handle to a data directory.
///
/// Layout:
/// ```text
/// <root>/conversions.json   records, newest first
/// <root>/audio/<id>.<ext>   finished audio
/// <root>/work/              scratch space for concatenation
/// ```
#[derive(Debug)]
pub struct Storage {
    audio_dir: PathBuf,
    work_dir: PathBuf,
    index_path: PathBuf,
    /// Serializes read-modify-write cycles on the index
    lock: Mutex<()>,
}

impl Storage {
    /// Open a store at `root`, creating its layout if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let audio_dir = root.join(AUDIO_DIR);
        let work_dir = root.join(WORK_DIR);
        let index_path = root.join(INDEX_FILE);

        fs::create_dir_all(&audio_dir)
            .with_context(|| format!("Failed to create {}", audio_dir.display()))?;
        fs::create_dir_all(&work_dir)
            .with_context(|| format!("Failed to create {}", work_dir.display()))?;

        if !index_path.exists() {
            debug!("Initializing {}", index_path.display());
            write_index(&index_path, &[])?;
        }

        Ok(Self {
            audio_dir,
            work_dir,
            index_path,
            lock: Mutex::new(()),
        })
    }

    /// Scratch directory for concatenation
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// All records, newest first.
    pub fn list(&self) -> Result<Vec<ConversionRecord>> {
        let _guard = self.lock()?;
        self.read_index()
    }

    pub fn get(&self, id: &str) -> Result<Option<ConversionRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Insert a record or replace the one with the same id.
    pub fn upsert(&self, record: &ConversionRecord) -> Result<()> {
        let _guard = self.lock()?;
        let mut records = self.read_index()?;

        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        write_index(&self.index_path, &records)
    }

    /// Remove a record and its audio. Returns false if the id is unknown.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let mut records = self.read_index()?;

        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let record = records.remove(pos);

        if let Some(path) = self.audio_path(&record) {
            if path.exists() {
                fs::remove_file(&path).context("Failed to remove audio file")?;
            }
        }

        write_index(&self.index_path, &records)?;
        Ok(true)
    }

    /// Write audio for a conversion, returning the stored file name.
    pub fn save_audio(&self, id: &str, extension: &str, audio: &[u8]) -> Result<String> {
        let file_name = format!("{}.{}", id, extension);
        let path = self.audio_dir.join(&file_name);

        fs::write(&path, audio)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved {} bytes to {}", audio.len(), path.display());

        Ok(file_name)
    }

    /// Location of a record's audio, if it has any.
    pub fn audio_path(&self, record: &ConversionRecord) -> Option<PathBuf> {
        record
            .output_file
            .as_ref()
            .map(|name| self.audio_dir.join(name))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Storage lock poisoned"))
    }

    fn read_index(&self) -> Result<Vec<ConversionRecord>> {
        let file = File::open(&self.index_path).context("Failed to open conversions index")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse conversions index")
    }
}

/// Write the index through a temporary file so readers never see a partial one.
fn write_index(path: &Path, records: &[ConversionRecord]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    let file = File::create(&tmp_path).context("Failed to create conversions index")?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, records)
        .context("Failed to write conversions index")?;
    writer.flush()?;

    fs::rename(&tmp_path, path).context("Failed to replace conversions index")?;
    Ok(())
}

/// Identifier for a conversion of `text` started at `at`.
///
/// First 16 hex characters of SHA256 over the text and timestamp.
pub fn conversion_id(text: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(at.to_rfc3339().as_bytes());
    let result = hasher.finalize();

    format!("{:x}", result)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::ConversionStatus;
    use chrono::Duration;
    use tempfile::TempDir;

    fn record(id: &str) -> ConversionRecord {
        ConversionRecord::new(
            id.to_string(),
            format!("Title {}", id),
            "input.txt".to_string(),
            "mock".to_string(),
            None,
            2,
        )
    }

    #[test]
    fn test_open_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("data");

        let storage = Storage::open(&root).unwrap();
        assert!(root.join("audio").is_dir());
        assert!(root.join("work").is_dir());
        assert!(root.join("conversions.json").is_file());
        assert_eq!(storage.work_dir(), root.join("work"));
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let temp_dir = TempDir::new().unwrap();

        let storage = Storage::open(temp_dir.path()).unwrap();
        storage.upsert(&record("a")).unwrap();
        drop(storage);

        let storage = Storage::open(temp_dir.path()).unwrap();
        let records = storage.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "a");
    }

    #[test]
    fn test_upsert_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();

        let mut rec = record("a");
        storage.upsert(&rec).unwrap();
        rec.mark_failed("boom".to_string());
        storage.upsert(&rec).unwrap();

        let records = storage.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ConversionStatus::Failed);
        assert_eq!(storage.get("a").unwrap().unwrap().error.as_deref(), Some("boom"));
        assert!(storage.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();

        let mut older = record("old");
        older.created_at = older.created_at - Duration::hours(1);
        storage.upsert(&older).unwrap();
        storage.upsert(&record("new")).unwrap();

        let ids: Vec<String> = storage.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_save_audio_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();

        let mut rec = record("a");
        let file_name = storage.save_audio("a", "wav", b"RIFF....WAVE").unwrap();
        assert_eq!(file_name, "a.wav");
        rec.mark_completed(file_name, 1.0, false, true);
        storage.upsert(&rec).unwrap();

        let path = storage.audio_path(&rec).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"RIFF....WAVE");

        assert!(storage.remove("a").unwrap());
        assert!(!path.exists());
        assert!(storage.list().unwrap().is_empty());
        assert!(!storage.remove("a").unwrap());
    }

    #[test]
    fn test_audio_path_without_output() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        assert!(storage.audio_path(&record("a")).is_none());
    }

    #[test]
    fn test_conversion_id() {
        let at = Utc::now();
        let id = conversion_id("hello", at);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, conversion_id("hello", at));
        assert_ne!(id, conversion_id("hello!", at));
        assert_ne!(id, conversion_id("hello", at + Duration::seconds(1)));
    }
}
