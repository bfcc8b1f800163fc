use super::{Delegate, Transcoder};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Lines of ffmpeg stderr kept in error messages
const STDERR_TAIL_LINES: usize = 8;

/// Audio/video transcoding through an ffmpeg executable.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    /// Verify the executable runs and return a ready engine.
    pub async fn init(ffmpeg_path: impl Into<String>) -> Result<Self> {
        let engine = Self {
            ffmpeg_path: ffmpeg_path.into(),
        };

        if !engine.is_available().await {
            return Err(AppError::EngineUnavailable(format!(
                "ffmpeg could not be started from '{}'",
                engine.ffmpeg_path
            )));
        }

        info!("Transcoding engine ready ({})", engine.ffmpeg_path);
        Ok(engine)
    }

    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Keep only the final component so a client name cannot escape the work dir
pub(crate) fn work_file_name(file_name: &str, fallback: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &[u8],
        file_name: &str,
        args: &[String],
        output_name: &str,
    ) -> Result<Vec<u8>> {
        let work_dir = tempfile::tempdir()?;
        let input_path = work_dir.path().join(work_file_name(file_name, "input"));
        let output_path = work_dir.path().join(work_file_name(output_name, "output"));
        tokio::fs::write(&input_path, source).await?;

        info!("Transcoding {} to {}", file_name, output_name);
        debug!(?args, "ffmpeg arguments");

        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .current_dir(work_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::EngineUnavailable(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::delegate(
                Delegate::Transcode,
                format!("ffmpeg exited with {}: {}", output.status, stderr_tail(&output.stderr)),
            ));
        }

        let data = tokio::fs::read(&output_path).await.map_err(|e| {
            AppError::delegate(Delegate::Transcode, format!("no output produced: {}", e))
        })?;

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_executable_is_unavailable() {
        let err = FfmpegTranscoder::init("/nonexistent/ffmpeg").await.err().unwrap();
        assert!(matches!(err, AppError::EngineUnavailable(_)));
    }

    #[test]
    fn test_work_file_name_strips_directories() {
        assert_eq!(work_file_name("../../etc/passwd", "input"), "passwd");
        assert_eq!(work_file_name("clip.mkv", "input"), "clip.mkv");
        assert_eq!(work_file_name("", "input"), "input");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (1..=20).map(|n| format!("line {}\n", n)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 13"));
        assert!(tail.ends_with("line 20"));
    }
}
