use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;

use talkreel::speech::{AudioFormat, SynthesizedSpeech, estimate_duration_secs, resolve_duration};
use talkreel::{AppConfig, AppContext, RawConfig, RenderArgs, ReplyRenderer as _};

#[derive(Parser, Debug)]
#[command(name = "talkreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Telegram bot.
    Serve(Box<RawConfig>),
    /// Render one captioned frame as a PNG.
    Preview(PreviewArgs),
    /// Render a reply video from text and an audio file (requires `ffmpeg` on PATH).
    Render(RenderCmdArgs),
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Caption text.
    #[arg(long)]
    text: String,

    /// Frame index (0-based).
    #[arg(long, default_value_t = 0)]
    frame: u64,

    /// Clip length used for caption timing; defaults to the word-count estimate.
    #[arg(long)]
    duration_secs: Option<f64>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Parser, Debug)]
struct RenderCmdArgs {
    /// Caption text.
    #[arg(long)]
    text: String,

    /// Speech track (mp3, wav or ogg).
    #[arg(long)]
    audio: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    render: RenderArgs,
}

fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();
    talkreel::telemetry::init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve(raw) => cmd_serve(*raw),
        Command::Preview(args) => cmd_preview(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn cmd_serve(raw: RawConfig) -> anyhow::Result<()> {
    let config = AppConfig::from_raw(raw).context("invalid configuration")?;
    let ctx = Arc::new(AppContext::build(config).context("failed to initialize")?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("talkreel-rt")
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(talkreel::transport::telegram::serve(ctx))?;
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let cfg = args.render.validate()?;
    let renderer = talkreel::build_renderer(&cfg)?;
    let duration = args
        .duration_secs
        .unwrap_or_else(|| estimate_duration_secs(&args.text));

    let captions = renderer.captions(&args.text, duration);
    let compositor = renderer.compositor();
    let total = compositor.total_frames(duration, cfg.fps);
    let background = cfg.background.source(cfg.canvas);
    let frame = compositor.compose_frame(
        background.as_ref(),
        &captions,
        args.frame.min(total.saturating_sub(1)),
        total,
        cfg.fps,
    )?;

    frame
        .to_rgba_image()?
        .save(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    info!(out = %args.out.display(), frame = args.frame, total, "preview written");
    Ok(())
}

fn cmd_render(args: RenderCmdArgs) -> anyhow::Result<()> {
    let cfg = args.render.validate()?;
    let format = AudioFormat::from_path(&args.audio)
        .with_context(|| format!("unsupported audio file '{}'", args.audio.display()))?;
    let audio = std::fs::read(&args.audio)
        .with_context(|| format!("read audio '{}'", args.audio.display()))?;
    let (duration_secs, duration_source) = resolve_duration(&audio, format, &args.text);
    let speech = SynthesizedSpeech {
        audio,
        format,
        duration_secs,
        duration_source,
    };

    let renderer = talkreel::build_renderer(&cfg)?;
    let video = renderer.render_reply(&args.text, &speech)?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &video.video_bytes)
        .with_context(|| format!("write mp4 '{}'", args.out.display()))?;
    info!(
        out = %args.out.display(),
        frames = video.frame_count,
        secs = video.audio_duration_seconds,
        "video written"
    );
    Ok(())
}
