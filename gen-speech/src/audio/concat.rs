//! Audio concatenation using FFmpeg, with a byte-level fallback.

use super::format::extension_for;
use super::tools::AudioTools;
use log::{debug, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use thiserror::Error;

/// Bitrate assumed when estimating duration from size alone.
pub const ASSUMED_BITRATE_BPS: u64 = 128_000;

#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("No audio buffers provided")]
    NoInput,

    #[error("ffmpeg concatenation failed: {stderr}")]
    Tool { stderr: String },

    #[error("I/O error during concatenation: {0}")]
    Io(#[from] io::Error),
}

/// How a concatenation was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatOutcome {
    /// Buffers were appended byte-for-byte because ffmpeg is unavailable.
    /// The result may click between clips or fail to play past the first.
    pub degraded: bool,
    pub bytes_written: u64,
}

/// Duration of a clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioDuration {
    pub seconds: f64,
    /// False when the value was estimated from the byte size and
    /// [`ASSUMED_BITRATE_BPS`]; such values are approximate.
    pub exact: bool,
}

/// Joins per-chunk audio buffers into one stream.
///
/// Intermediate files live in a fresh directory under `work_dir` for the
/// duration of one call and are removed however the call ends.
#[derive(Debug, Clone)]
pub struct Concatenator {
    tools: AudioTools,
    work_dir: PathBuf,
}

impl Concatenator {
    pub fn new(tools: AudioTools, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            work_dir: work_dir.into(),
        }
    }

    /// Concatenate `buffers` in order and write the result to `sink`.
    ///
    /// A single buffer is written through untouched. Several buffers are
    /// joined with ffmpeg's concat demuxer, retried once with the concat
    /// filter; without ffmpeg they are appended byte-for-byte.
    pub fn concatenate<B, W>(&self, buffers: &[B], sink: &mut W) -> Result<ConcatOutcome, ConcatError>
    where
        B: AsRef<[u8]>,
        W: Write,
    {
        match buffers {
            [] => Err(ConcatError::NoInput),
            [single] => {
                let bytes = single.as_ref();
                sink.write_all(bytes)?;
                Ok(ConcatOutcome {
                    degraded: false,
                    bytes_written: bytes.len() as u64,
                })
            }
            _ => match self.tools.ffmpeg() {
                Some(ffmpeg) => {
                    let joined = self.remux(ffmpeg, buffers)?;
                    sink.write_all(&joined)?;
                    Ok(ConcatOutcome {
                        degraded: false,
                        bytes_written: joined.len() as u64,
                    })
                }
                None => {
                    warn!(
                        "ffmpeg not available; joining {} clips byte-for-byte, output may have audible artifacts",
                        buffers.len()
                    );
                    let mut bytes_written = 0;
                    for buffer in buffers {
                        sink.write_all(buffer.as_ref())?;
                        bytes_written += buffer.as_ref().len() as u64;
                    }
                    Ok(ConcatOutcome {
                        degraded: true,
                        bytes_written,
                    })
                }
            },
        }
    }

    /// Concatenate into a new buffer.
    pub fn concatenate_to_vec<B: AsRef<[u8]>>(
        &self,
        buffers: &[B],
    ) -> Result<(Vec<u8>, ConcatOutcome), ConcatError> {
        let mut joined = Vec::new();
        let outcome = self.concatenate(buffers, &mut joined)?;
        Ok((joined, outcome))
    }

    /// Duration of a clip, from ffprobe when possible.
    ///
    /// Falls back to an estimate from the byte size, flagged `exact: false`.
    pub fn duration(&self, audio: &[u8]) -> AudioDuration {
        if self.tools.ffprobe().is_some() && !audio.is_empty() {
            match self.probe(audio) {
                Ok(seconds) => {
                    return AudioDuration {
                        seconds,
                        exact: true,
                    };
                }
                Err(e) => warn!("Could not probe audio duration, estimating: {:#}", e),
            }
        }

        AudioDuration {
            seconds: estimate_duration(audio.len()),
            exact: false,
        }
    }

    fn remux<B: AsRef<[u8]>>(&self, ffmpeg: &Path, buffers: &[B]) -> Result<Vec<u8>, ConcatError> {
        let scratch = self.scratch_dir("concat-")?;
        let ext = extension_for(buffers);

        let mut inputs = Vec::with_capacity(buffers.len());
        for (i, buffer) in buffers.iter().enumerate() {
            let path = scratch.path().join(format!("part_{:04}.{}", i, ext));
            fs::write(&path, buffer.as_ref())?;
            inputs.push(path);
        }

        let list_file = scratch.path().join("concat_list.txt");
        fs::write(&list_file, concat_manifest(&inputs))?;

        let output_path = scratch.path().join(format!("joined.{}", ext));

        if let Err(stderr) = run_ffmpeg(demuxer_command(ffmpeg, &list_file, &output_path)) {
            warn!(
                "ffmpeg concat demuxer failed, retrying with concat filter: {}",
                stderr.lines().last().unwrap_or_default()
            );
            run_ffmpeg(filter_command(ffmpeg, &inputs, &output_path))
                .map_err(|stderr| ConcatError::Tool { stderr })?;
        }

        let joined = fs::read(&output_path)?;
        close_scratch(scratch);
        Ok(joined)
    }

    fn probe(&self, audio: &[u8]) -> anyhow::Result<f64> {
        let scratch = self.scratch_dir("probe-")?;
        let path = scratch
            .path()
            .join(format!("clip.{}", extension_for(&[audio])));
        fs::write(&path, audio)?;

        let seconds = self.tools.probe_duration(&path)?;
        close_scratch(scratch);
        Ok(seconds)
    }

    /// Create a uniquely named directory for one invocation's files.
    fn scratch_dir(&self, prefix: &str) -> io::Result<TempDir> {
        fs::create_dir_all(&self.work_dir)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.work_dir)
    }
}

/// Duration in seconds of `len` bytes at [`ASSUMED_BITRATE_BPS`].
pub fn estimate_duration(len: usize) -> f64 {
    (len as u64 * 8) as f64 / ASSUMED_BITRATE_BPS as f64
}

/// Build an ffmpeg concat demuxer file list.
fn concat_manifest(inputs: &[PathBuf]) -> String {
    let mut list_content = String::new();
    for path in inputs {
        // Escape single quotes in path
        let path_str = path.to_string_lossy().replace('\'', "'\\''");
        list_content.push_str(&format!("file '{}'\n", path_str));
    }
    list_content
}

/// Stream-copy concatenation; exact, but needs matching stream parameters.
fn demuxer_command(ffmpeg: &Path, list_file: &Path, output_path: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(list_file)
        .args(["-c", "copy"])
        .arg(output_path);
    cmd
}

/// Decode-and-re-encode concatenation through the concat filter.
fn filter_command(ffmpeg: &Path, inputs: &[PathBuf], output_path: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-y"]);

    let mut graph = String::new();
    for (i, input) in inputs.iter().enumerate() {
        cmd.arg("-i").arg(input);
        graph.push_str(&format!("[{}:a]", i));
    }
    graph.push_str(&format!("concat=n={}:v=0:a=1[out]", inputs.len()));

    cmd.args(["-filter_complex", graph.as_str(), "-map", "[out]"])
        .arg(output_path);
    cmd
}

/// Run ffmpeg, returning its stderr on failure.
fn run_ffmpeg(mut cmd: Command) -> Result<(), String> {
    debug!("Running {:?}", cmd);

    let output = cmd
        .output()
        .map_err(|e| format!("Failed to run ffmpeg: {}", e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

fn close_scratch(scratch: TempDir) {
    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;
    use tempfile::TempDir;
    use tts_client::providers::mock::silent_wav;

    fn offline(work_dir: &Path) -> Concatenator {
        Concatenator::new(AudioTools::none(), work_dir)
    }

    fn dir_is_empty(path: &Path) -> bool {
        fs::read_dir(path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    #[test]
    fn test_no_input() {
        let temp_dir = TempDir::new().unwrap();
        let result = offline(temp_dir.path()).concatenate_to_vec::<Vec<u8>>(&[]);
        assert!(matches!(result, Err(ConcatError::NoInput)));
    }

    #[test]
    fn test_single_buffer_is_identity() {
        let temp_dir = TempDir::new().unwrap();
        let clip = silent_wav(100);

        let mut sink = Vec::new();
        let outcome = offline(temp_dir.path())
            .concatenate(&[clip.clone()], &mut sink)
            .unwrap();

        assert_eq!(sink, clip);
        assert!(!outcome.degraded);
        assert_eq!(outcome.bytes_written, clip.len() as u64);
    }

    #[test]
    fn test_single_buffer_skips_ffmpeg() {
        let temp_dir = TempDir::new().unwrap();
        let work_dir = temp_dir.path().join("work");
        // Real tools if present: still no scratch files for one buffer.
        let concatenator = Concatenator::new(AudioTools::locate(None, None), &work_dir);

        let (joined, _) = concatenator.concatenate_to_vec(&[b"opaque".to_vec()]).unwrap();
        assert_eq!(joined, b"opaque");
        assert!(!work_dir.exists());
    }

    #[test]
    fn test_degraded_mode_appends_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let a = vec![1u8; 150];
        let b = vec![2u8; 250];

        let (joined, outcome) = offline(temp_dir.path())
            .concatenate_to_vec(&[a.clone(), b.clone()])
            .unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.bytes_written, 400);
        assert_eq!(&joined[..150], &a[..]);
        assert_eq!(&joined[150..], &b[..]);
    }

    #[test]
    fn test_estimated_duration() {
        let temp_dir = TempDir::new().unwrap();
        let duration = offline(temp_dir.path()).duration(&vec![0u8; 16_000]);
        assert!(!duration.exact);
        assert!((duration.seconds - 1.0).abs() < 1e-9);

        assert_eq!(estimate_duration(0), 0.0);
    }

    #[test]
    fn test_concat_manifest_escapes_quotes() {
        let manifest = concat_manifest(&[
            PathBuf::from("/tmp/a.mp3"),
            PathBuf::from("/tmp/it's.mp3"),
        ]);
        assert_eq!(manifest, "file '/tmp/a.mp3'\nfile '/tmp/it'\\''s.mp3'\n");
    }

    #[test]
    fn test_filter_command_graph() {
        let cmd = filter_command(
            Path::new("ffmpeg"),
            &[PathBuf::from("a.wav"), PathBuf::from("b.wav")],
            Path::new("out.wav"),
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"[0:a][1:a]concat=n=2:v=0:a=1[out]".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.wav"));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, filter_succeeds: bool) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let filter_action = if filter_succeeds {
            "printf retried > \"$last\"; exit 0"
        } else {
            "echo 'filter failed' >&2; exit 1"
        };
        let script = format!(
            "#!/bin/sh\n\
             for last; do :; done\n\
             case \"$*\" in *-version*) exit 0 ;; esac\n\
             echo call >> '{}'\n\
             case \"$*\" in\n\
             *-filter_complex*) {} ;;\n\
             *) echo 'demuxer rejected input' >&2; exit 1 ;;\n\
             esac\n",
            log.display(),
            filter_action
        );

        let path = dir.join("fake-ffmpeg");
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    fn call_count(dir: &Path) -> usize {
        fs::read_to_string(dir.join("calls.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[cfg(unix)]
    #[test]
    fn test_retries_with_concat_filter() {
        let temp_dir = TempDir::new().unwrap();
        let work_dir = temp_dir.path().join("work");
        let ffmpeg = fake_ffmpeg(temp_dir.path(), true);
        let concatenator = Concatenator::new(AudioTools::locate(Some(&ffmpeg), None), &work_dir);

        let (joined, outcome) = concatenator
            .concatenate_to_vec(&[silent_wav(100), silent_wav(100)])
            .unwrap();

        assert_eq!(joined, b"retried");
        assert!(!outcome.degraded);
        assert_eq!(call_count(temp_dir.path()), 2);
        assert!(dir_is_empty(&work_dir));
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_error_after_retry_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let work_dir = temp_dir.path().join("work");
        let ffmpeg = fake_ffmpeg(temp_dir.path(), false);
        let concatenator = Concatenator::new(AudioTools::locate(Some(&ffmpeg), None), &work_dir);

        let result = concatenator.concatenate_to_vec(&[silent_wav(100), silent_wav(100)]);

        match result {
            Err(ConcatError::Tool { stderr }) => assert!(stderr.contains("filter failed")),
            other => panic!("expected tool error, got {:?}", other.map(|(_, o)| o)),
        }
        assert_eq!(call_count(temp_dir.path()), 2);
        assert!(dir_is_empty(&work_dir));
    }

    #[test]
    fn test_ffmpeg_concatenation_duration() {
        let tools = AudioTools::locate(None, None);
        if tools.ffmpeg().is_none() || tools.ffprobe().is_none() {
            eprintln!("ffmpeg/ffprobe not installed, skipping");
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let concatenator = Concatenator::new(tools, temp_dir.path());
        let a = silent_wav(500);
        let b = silent_wav(700);

        let (joined, outcome) = concatenator.concatenate_to_vec(&[a.clone(), b.clone()]).unwrap();
        assert!(!outcome.degraded);
        assert_eq!(AudioFormat::detect(&joined), Some(AudioFormat::Wav));

        let total = concatenator.duration(&joined);
        let parts = concatenator.duration(&a).seconds + concatenator.duration(&b).seconds;
        assert!(total.exact);
        assert!((total.seconds - parts).abs() < 0.05, "{} vs {}", total.seconds, parts);
        assert!((total.seconds - 1.2).abs() < 0.05);
        assert!(dir_is_empty(temp_dir.path()));
    }

    #[test]
    fn test_ffmpeg_rejects_garbage() {
        let tools = AudioTools::locate(None, None);
        if tools.ffmpeg().is_none() {
            eprintln!("ffmpeg not installed, skipping");
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let concatenator = Concatenator::new(tools, temp_dir.path());
        let result = concatenator.concatenate_to_vec(&[vec![0x42u8; 500], vec![0x42u8; 500]]);

        assert!(matches!(result, Err(ConcatError::Tool { .. })));
        assert!(dir_is_empty(temp_dir.path()));
    }
}
