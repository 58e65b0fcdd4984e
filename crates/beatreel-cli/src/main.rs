//! beatreel command-line tool.
//!
//! ```text
//! beatreel analyze song.mp3
//! beatreel assemble song.mp3 -v a.mp4 -v b.mp4 -o reel.mp4 --beats "0:02, 0:05.5"
//! ```

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beatreel_media::{cancel_pair, progress_channel, AssemblyContext, ReelRequest, RunControl};
use beatreel_models::{
    format_seconds, manual_beats, parse_beat_marks, parse_timestamp, MediaSource, ReelConfig, SourceId,
};

#[derive(Parser)]
#[command(name = "beatreel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cut video clips to the beat of a soundtrack")]
struct Cli {
    /// JSON config file (fields not set keep their defaults)
    #[arg(short, long, global = true, env = "BEATREEL_CONFIG")]
    config: Option<PathBuf>,

    /// Write Prometheus metrics text here when the command finishes
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect beats in an audio file
    Analyze {
        audio: PathBuf,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a reel from a soundtrack and video clips
    Assemble {
        audio: PathBuf,

        /// Source video (repeatable, order matters)
        #[arg(short = 'v', long = "video", required = true)]
        videos: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Manual beat marks instead of detection, e.g. "0:02, 0:05.5, 9"
        #[arg(long)]
        beats: Option<String>,

        /// Reel end on the music timeline (seconds or MM:SS)
        #[arg(long)]
        end_time: Option<String>,

        /// Write the run report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the JSON schema of the config file
    Schema,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("beatreel=info,beatreel_media=info,beatreel_cli=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder unavailable: {}", e);
            None
        }
    };

    let result = run(&cli).await;
    write_metrics(cli.metrics_out.as_deref(), metrics.as_ref())?;
    result
}

async fn run(cli: &Cli) -> Result<()> {
    if let Commands::Schema = cli.command {
        let schema = schemars::schema_for!(ReelConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = config::load_config(cli.config.as_deref())?;
    debug!(?config, "Loaded configuration");
    let ctx = AssemblyContext::with_ffmpeg(config).context("Failed to set up the FFmpeg backend")?;

    let (cancel, control) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    match &cli.command {
        Commands::Analyze { audio, json } => analyze(&ctx, audio, *json, &control).await,
        Commands::Assemble {
            audio,
            videos,
            output,
            beats,
            end_time,
            report,
        } => {
            let audio = read_source(audio).await?;
            let mut sources = Vec::with_capacity(videos.len());
            for (path, id) in videos.iter().zip(video_ids(videos)) {
                let mut source = read_source(path).await?;
                source.id = SourceId::from(id);
                sources.push(source);
            }

            let mut request = ReelRequest::new(audio, sources);
            if let Some(marks) = beats {
                let times = parse_beat_marks(marks).context("Invalid --beats")?;
                request = request.with_manual_beats(manual_beats(&times));
            }
            if let Some(end) = end_time {
                request = request.with_end_time(parse_timestamp(end).context("Invalid --end-time")?);
            }

            assemble(&ctx, request, output, report.as_deref(), &control).await
        }
        Commands::Schema => Ok(()),
    }
}

async fn analyze(ctx: &AssemblyContext, path: &Path, json: bool, control: &RunControl) -> Result<()> {
    let audio = read_source(path).await?;
    let analysis = ctx
        .detect_beats(&audio, control)
        .await
        .with_context(|| format!("Beat detection failed for {}", path.display()))?;

    if json {
        let value = serde_json::json!({
            "beats": analysis.beats,
            "tempo_bpm": analysis.tempo_bpm,
            "energy": analysis.energy,
            "confidence": analysis.confidence,
            "detected_count": analysis.detected_count,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{} beats detected, tempo {} BPM, confidence {:.2}",
            analysis.detected_count, analysis.tempo_bpm, analysis.confidence
        );
        for beat in &analysis.beats {
            println!("  {}  {:<6} {:.2}", format_seconds(beat.time), beat.band, beat.confidence);
        }
    }
    Ok(())
}

async fn assemble(
    ctx: &AssemblyContext,
    request: ReelRequest,
    output: &Path,
    report_path: Option<&Path>,
    control: &RunControl,
) -> Result<()> {
    let (sink, mut progress) = progress_channel(128);
    let reporter = tokio::spawn(async move {
        while let Some(percent) = progress.recv().await {
            if percent % 10 == 0 {
                info!(percent, "Progress");
            }
        }
    });

    let result = ctx.assemble_reel(request, Some(sink), control).await;
    reporter.await.ok();
    let reel = result.context("Reel assembly failed")?;

    tokio::fs::write(output, &reel.clip.data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        output = %output.display(),
        bytes = reel.clip.size(),
        strategy = %reel.report.merge_strategy,
        segments = reel.report.segments_trimmed,
        "Reel written"
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&reel.report)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }
    Ok(())
}

async fn read_source(path: &Path) -> Result<MediaSource> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if data.is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(MediaSource::new(source_id(path), data, mime_for_path(path)))
}

/// IDs for the video list: the file stem, suffixed with its 1-based
/// position until no earlier video holds the same ID.
fn video_ids(paths: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(paths.len());
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let mut id = source_id(path);
            while taken.contains(&id) {
                id = format!("{}_{}", id, index + 1);
            }
            taken.insert(id.clone());
            id
        })
        .collect()
}

fn source_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

fn write_metrics(path: Option<&Path>, handle: Option<&PrometheusHandle>) -> Result<()> {
    if let (Some(path), Some(handle)) = (path, handle) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }
    Ok(())
}
