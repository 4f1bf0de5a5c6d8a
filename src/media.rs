use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::foundation::error::{TalkreelError, TalkreelResult};

/// Basic metadata about an encoded media file.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// Video width, when a video stream exists.
    pub width: Option<u32>,
    /// Video height, when a video stream exists.
    pub height: Option<u32>,
    pub has_audio: bool,
}

/// Return `true` when `tool -version` runs successfully.
pub fn is_tool_on_path(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

static FFMPEG_AVAILABLE: OnceLock<bool> = OnceLock::new();
static FFPROBE_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Checked once per process; later calls reuse the first answer.
fn tool_available(cell: &OnceLock<bool>, tool: &str) -> bool {
    *cell.get_or_init(|| is_tool_on_path(tool))
}

pub fn is_ffmpeg_on_path() -> bool {
    tool_available(&FFMPEG_AVAILABLE, "ffmpeg")
}

pub fn is_ffprobe_on_path() -> bool {
    tool_available(&FFPROBE_AVAILABLE, "ffprobe")
}

/// Probe container metadata through `ffprobe`.
pub fn probe_media(source_path: &Path) -> TalkreelResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| TalkreelError::validation(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(TalkreelError::validation(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| TalkreelError::validation(format!("ffprobe json parse failed: {e}")))?;
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| TalkreelError::validation("ffprobe reported no usable duration"))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        duration_secs,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        has_audio,
    })
}

/// Decoded duration of an audio (or any media) file in seconds.
pub fn probe_duration_secs(source_path: &Path) -> TalkreelResult<f64> {
    probe_media(source_path).map(|info| info.duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_reported_and_remembered() {
        let cell = OnceLock::new();
        assert!(!tool_available(&cell, "talkreel-no-such-tool"));
        assert_eq!(cell.get(), Some(&false));

        // The cached answer wins even for a different tool name.
        assert!(!tool_available(&cell, "sh"));
    }

    #[test]
    fn probing_a_missing_file_fails() {
        if !is_ffprobe_on_path() {
            eprintln!("skipping: ffprobe not on PATH");
            return;
        }
        assert!(probe_media(Path::new("/nonexistent/talkreel.mp3")).is_err());
    }
}
