//! ffmpeg invocation for merging and converting downloaded streams.
//!
//! Every operation runs ffmpeg once, surfaces its stderr verbatim on failure,
//! and deletes its inputs after a successful run.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::progress::{Progress, ProgressReporter};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Video containers a job can produce.
pub const SUPPORTED_CONTAINERS: &[&str] = &["mp4", "flv"];

/// Audio formats [`Transcoder::convert_audio`] accepts.
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "wav", "flac", "m4a", "aac"];

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("{program} is not available: {reason}")]
    ToolMissing { program: String, reason: String },

    #[error("{program} failed (exit code {code:?}): {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unsupported audio format `{0}`")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder settings per audio format. Lossy formats get the best VBR or a
/// 320k fixed rate; lossless ones PCM or maximum FLAC compression.
fn audio_profile(format: &str) -> Result<&'static [&'static str], TranscodeError> {
    let profile: &'static [&'static str] = match format.to_ascii_lowercase().as_str() {
        "mp3" => &["-c:a", "libmp3lame", "-q:a", "0"],
        "wav" => &["-c:a", "pcm_s16le"],
        "flac" => &["-c:a", "flac", "-compression_level", "8"],
        "m4a" | "aac" => &["-c:a", "aac", "-b:a", "320k", "-strict", "experimental"],
        _ => return Err(TranscodeError::UnsupportedFormat(format.to_string())),
    };
    Ok(profile)
}

fn base_args() -> Vec<OsString> {
    ["-y", "-hide_banner", "-loglevel", "warning"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args();
    let tail: [OsString; 15] = [
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-strict".into(),
        "experimental".into(),
        output.into(),
    ];
    args.extend(tail);
    args
}

fn convert_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args();
    let tail: [OsString; 7] = [
        "-i".into(),
        input.into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        output.into(),
    ];
    args.extend(tail);
    args
}

fn audio_args(input: &Path, output: &Path, profile: &[&str]) -> Vec<OsString> {
    let mut args = base_args();
    let head: [OsString; 3] = ["-i".into(), input.into(), "-vn".into()];
    args.extend(head);
    args.extend(profile.iter().copied().map(OsString::from));
    args.push(output.into());
    args
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Runs the external ffmpeg binary.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: String,
}

impl Transcoder {
    /// Uses `FFMPEG_PATH` when set, else `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }

    pub fn with_ffmpeg_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.ffmpeg_path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        cmd.env("LC_ALL", "C")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn missing(&self, reason: impl Into<String>) -> TranscodeError {
        TranscodeError::ToolMissing {
            program: self.ffmpeg_path.clone(),
            reason: reason.into(),
        }
    }

    /// Check that ffmpeg can be started. Run before any download.
    pub async fn ensure_available(&self) -> Result<(), TranscodeError> {
        let status = self
            .command()
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.missing(e.to_string()))?;

        if !status.success() {
            return Err(self.missing(format!("`-version` exited with {status}")));
        }
        debug!(program = %self.ffmpeg_path, "ffmpeg is available");
        Ok(())
    }

    /// Copy the video stream and re-encode the audio to AAC into one file.
    #[instrument(skip_all, fields(output = %output.display()))]
    pub async fn merge_video_audio(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeError> {
        let args = merge_args(video, audio, output);
        let label = "merging video and audio";
        self.run(args, &[video, audio], output, label, reporter)
            .await
    }

    /// Remux into the container implied by `output`'s extension.
    #[instrument(skip_all, fields(output = %output.display()))]
    pub async fn convert_container(
        &self,
        input: &Path,
        output: &Path,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeError> {
        self.run(convert_args(input, output), &[input], output, "converting container", reporter)
            .await
    }

    #[instrument(skip_all, fields(output = %output.display(), format = %format))]
    pub async fn convert_audio(
        &self,
        input: &Path,
        output: &Path,
        format: &str,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeError> {
        let profile = audio_profile(format)?;
        let label = format!("converting to {}", format.to_ascii_uppercase());
        self.run(audio_args(input, output, profile), &[input], output, &label, reporter)
            .await
    }

    async fn run(
        &self,
        args: Vec<OsString>,
        inputs: &[&Path],
        output: &Path,
        label: &str,
        reporter: &ProgressReporter,
    ) -> Result<(), TranscodeError> {
        reporter.report(Progress::new(0, 100, label));
        debug!(program = %self.ffmpeg_path, ?args, "Running ffmpeg");

        let result = self
            .command()
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => self.missing(e.to_string()),
                _ => TranscodeError::Io(e),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            warn!(code = ?result.status.code(), stderr = %stderr.trim_end(), "ffmpeg failed");
            return Err(TranscodeError::Failed {
                program: self.ffmpeg_path.clone(),
                code: result.status.code(),
                stderr,
            });
        }

        for input in inputs {
            if same_path(input, output) {
                continue;
            }
            match tokio::fs::remove_file(input).await {
                Ok(()) => debug!(path = %input.display(), "Removed intermediate file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %input.display(), error = %e, "Failed to remove intermediate file")
                }
            }
        }

        reporter.report(Progress::new(100, 100, label));
        info!(output = %output.display(), "{label} finished");
        Ok(())
    }
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_merge_args() {
        let args = strings(&merge_args(
            Path::new("v.m4s"),
            Path::new("a.m4s"),
            Path::new("out.mp4"),
        ));
        assert_eq!(
            args,
            vec![
                "-y", "-hide_banner", "-loglevel", "warning", "-i", "v.m4s", "-i", "a.m4s",
                "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-strict",
                "experimental", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_convert_args_copy_video() {
        let args = strings(&convert_args(Path::new("in.mp4"), Path::new("out.flv")));
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert_eq!(args.last().unwrap(), "out.flv");
    }

    #[test]
    fn test_audio_profiles() {
        assert_eq!(audio_profile("mp3").unwrap(), ["-c:a", "libmp3lame", "-q:a", "0"]);
        assert_eq!(audio_profile("FLAC").unwrap()[1], "flac");
        assert_eq!(audio_profile("wav").unwrap(), ["-c:a", "pcm_s16le"]);
        assert_eq!(audio_profile("m4a").unwrap(), audio_profile("aac").unwrap());
        for format in SUPPORTED_AUDIO_FORMATS {
            assert!(audio_profile(format).is_ok());
        }
        assert!(matches!(
            audio_profile("ogg"),
            Err(TranscodeError::UnsupportedFormat(f)) if f == "ogg"
        ));

        let wav = audio_profile("wav").unwrap();
        let args = strings(&audio_args(Path::new("in.m4s"), Path::new("out.wav"), wav));
        assert!(args.contains(&"-vn".to_string()));
        assert_eq!(args.last().unwrap(), "out.wav");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let transcoder = Transcoder::with_ffmpeg_path("/nonexistent/ffmpeg");
        assert!(matches!(
            transcoder.ensure_available().await,
            Err(TranscodeError::ToolMissing { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let err = transcoder
            .convert_container(
                &dir.path().join("a"),
                &dir.path().join("b.mp4"),
                &ProgressReporter::noop(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::ToolMissing { .. }));
    }

    #[cfg(unix)]
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_keeps_stderr_and_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = script(
            dir.path(),
            "ffmpeg",
            "printf '[mov] moov atom not found\\n  a.m4s: Invalid data found when processing input\\n' >&2\nexit 1",
        );
        let input = dir.path().join("a.m4s");
        std::fs::write(&input, b"not audio").unwrap();

        let transcoder = Transcoder::with_ffmpeg_path(ffmpeg.to_string_lossy());
        let err = transcoder
            .convert_audio(&input, &dir.path().join("a.mp3"), "mp3", &ProgressReporter::noop())
            .await
            .unwrap_err();

        match err {
            TranscodeError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(
                    stderr,
                    "[mov] moov atom not found\n  a.m4s: Invalid data found when processing input\n"
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(input.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_removes_input_unless_it_is_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = script(
            dir.path(),
            "ffmpeg",
            "if [ \"$1\" = \"-version\" ]; then exit 0; fi\nfor last; do :; done\n: > \"$last\"",
        );
        let transcoder = Transcoder::with_ffmpeg_path(ffmpeg.to_string_lossy());
        transcoder.ensure_available().await.unwrap();

        let input = dir.path().join("song_temp.m4s");
        let output = dir.path().join("song.flac");
        std::fs::write(&input, b"audio").unwrap();

        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter =
            ProgressReporter::new(move |p: Progress| sink.lock().unwrap().push(p.percent));

        transcoder
            .convert_audio(&input, &output, "flac", &reporter)
            .await
            .unwrap();
        assert!(output.exists());
        assert!(!input.exists());
        assert_eq!(*events.lock().unwrap(), vec![0.0, 100.0]);

        // Converting in place must not delete the result.
        transcoder
            .convert_container(&output, &output, &ProgressReporter::noop())
            .await
            .unwrap();
        assert!(output.exists());
    }
}
