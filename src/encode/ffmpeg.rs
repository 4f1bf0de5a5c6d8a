use std::io::{Read, Write as _};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::foundation::math::mul_div255_u16;
use crate::media::is_ffmpeg_on_path;
use crate::render::frame::FrameRGBA;

/// Where the video note is written and what shows through transparent pixels.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    /// Opaque RGB behind any pixel that is not fully covered.
    pub matte: [u8; 3],
    /// x264 speed preset; video notes are short, so speed wins over size.
    pub preset: &'static str,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            matte: [0, 0, 0],
            preset: "veryfast",
        }
    }
}

/// Running encoder: the child process, its stdin, and a thread collecting its stderr.
struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl Encoder {
    fn spawn(mut cmd: Command) -> TalkreelResult<Self> {
        let mut child = cmd
            .spawn()
            .map_err(|e| TalkreelError::render(format!("could not start ffmpeg: {e}")))?;
        let stdin = child.stdin.take();
        let mut pipe = child
            .stderr
            .take()
            .ok_or_else(|| TalkreelError::render("ffmpeg started without a stderr pipe"))?;
        let stderr = std::thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        });
        Ok(Self {
            child,
            stdin,
            stderr: Some(stderr),
        })
    }

    fn write(&mut self, bytes: &[u8]) -> TalkreelResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TalkreelError::render("ffmpeg stdin already closed"))?;
        stdin
            .write_all(bytes)
            .map_err(|e| TalkreelError::render(format!("ffmpeg stopped accepting frames: {e}")))
    }

    /// Close stdin and wait; a non-zero exit carries ffmpeg's own diagnostics.
    fn finish(mut self) -> TalkreelResult<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| TalkreelError::render(format!("lost track of ffmpeg: {e}")))?;
        let log = match self.stderr.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TalkreelError::render("ffmpeg log reader panicked"))?
                .map_err(|e| TalkreelError::render(format!("reading ffmpeg log: {e}")))?,
            None => Vec::new(),
        };
        if status.success() {
            return Ok(());
        }
        Err(TalkreelError::render(format!(
            "ffmpeg exited with status {status}: {}",
            String::from_utf8_lossy(&log).trim()
        )))
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        if self.stdin.take().is_none() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!(error = %e, "could not stop an unfinished ffmpeg encode");
        }
        let _ = self.child.wait();
    }
}

/// Encodes frames into an H.264/AAC MP4 by piping opaque RGBA into the system `ffmpeg`.
///
/// When speech is attached the muxed file ends with the shorter stream (`-shortest`).
/// Dropping the sink mid-encode kills the process.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    encoder: Option<Encoder>,
    cfg: Option<SinkConfig>,
    opaque: Vec<u8>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            encoder: None,
            cfg: None,
            opaque: Vec::new(),
            last_idx: None,
        }
    }

    fn build_command(&self, cfg: &SinkConfig) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let size = format!("{}x{}", cfg.width, cfg.height);
        let rate = format!("{}/{}", cfg.fps.num, cfg.fps.den);
        // Input 0: raw frames on stdin; the rate must precede `-i`.
        cmd.args(["-y", "-loglevel", "error"]);
        cmd.args(["-f", "rawvideo", "-pix_fmt", "rgba", "-s", &size, "-r", &rate]);
        cmd.args(["-i", "pipe:0"]);

        match cfg.audio.as_ref() {
            Some(speech) => {
                cmd.arg("-i").arg(&speech.path);
                cmd.args(["-map", "0:v:0", "-map", "1:a:0", "-c:a", "aac", "-shortest"]);
            }
            None => {
                cmd.arg("-an");
            }
        }
        cmd.args(["-c:v", "libx264", "-preset", self.opts.preset]);
        cmd.args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);
        cmd.arg(&self.opts.out_path);
        cmd
    }
}

/// Rejects settings ffmpeg would only fail on after spawning.
fn check_config(cfg: &SinkConfig) -> TalkreelResult<()> {
    if cfg.fps.num == 0 || cfg.fps.den == 0 {
        return Err(TalkreelError::validation("video note frame rate is zero"));
    }
    if cfg.width == 0 || cfg.height == 0 {
        return Err(TalkreelError::validation(format!(
            "video note canvas {}x{} is empty",
            cfg.width, cfg.height
        )));
    }
    if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
        return Err(TalkreelError::validation(format!(
            "video note canvas {}x{} must have even sides for yuv420p",
            cfg.width, cfg.height
        )));
    }
    if let Some(speech) = cfg.audio.as_ref()
        && !speech.path.is_file()
    {
        return Err(TalkreelError::render(format!(
            "speech track '{}' is missing",
            speech.path.display()
        )));
    }
    Ok(())
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> TalkreelResult<()> {
        check_config(&cfg)?;
        if let Some(dir) = self.opts.out_path.parent() {
            use anyhow::Context as _;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating video note directory '{}'", dir.display()))?;
        }
        if !is_ffmpeg_on_path() {
            return Err(TalkreelError::render(
                "rendering video notes needs ffmpeg on PATH",
            ));
        }

        let encoder = Encoder::spawn(self.build_command(&cfg))?;
        debug!(
            width = cfg.width,
            height = cfg.height,
            fps = cfg.fps.as_f64(),
            audio = cfg.audio.is_some(),
            "ffmpeg encoder started"
        );
        self.opaque = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4];
        self.encoder = Some(encoder);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> TalkreelResult<()> {
        let (Some(cfg), Some(encoder)) = (self.cfg.as_ref(), self.encoder.as_mut()) else {
            return Err(TalkreelError::render("frame pushed before the encoder started"));
        };
        if self.last_idx.is_some_and(|last| idx <= last) {
            return Err(TalkreelError::render(format!(
                "frame {} arrived after frame {}",
                idx.0,
                self.last_idx.map_or(0, |l| l.0)
            )));
        }
        if frame.width != cfg.width
            || frame.height != cfg.height
            || frame.data.len() != self.opaque.len()
        {
            return Err(TalkreelError::validation(format!(
                "frame {} is {}x{} ({} bytes); the video note is {}x{}",
                idx.0,
                frame.width,
                frame.height,
                frame.data.len(),
                cfg.width,
                cfg.height
            )));
        }
        self.last_idx = Some(idx);

        matte_premultiplied(&mut self.opaque, &frame.data, self.opts.matte)?;
        encoder.write(&self.opaque)
    }

    fn end(&mut self) -> TalkreelResult<()> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| TalkreelError::render("encoder finished before it started"))?;
        self.cfg = None;
        encoder.finish()
    }
}

/// Composite premultiplied RGBA over an opaque matte, writing fully opaque RGBA.
fn matte_premultiplied(out: &mut [u8], premul: &[u8], matte: [u8; 3]) -> TalkreelResult<()> {
    if out.len() != premul.len() || !out.len().is_multiple_of(4) {
        return Err(TalkreelError::validation(
            "matte buffers must be equal-length RGBA",
        ));
    }
    for (o, p) in out.chunks_exact_mut(4).zip(premul.chunks_exact(4)) {
        let uncovered = 255 - u16::from(p[3]);
        for ((dst, &src), &m) in o.iter_mut().zip(&p[..3]).zip(&matte) {
            *dst = (u16::from(src) + mul_div255_u16(u16::from(m), uncovered)).min(255) as u8;
        }
        o[3] = 255;
    }
    Ok(())
}
