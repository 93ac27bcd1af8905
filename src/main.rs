// src/main.rs - Replays a pose source through the analysis pipeline
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use physio_core::adaptive::{
    get_comprehensive_adaptive_settings, EnvironmentConditions, LightingAssessment, PatientProfile,
};
use physio_core::data::SessionExporter;
use physio_core::pose_source::{PoseSource, RecordedPoseSource, SyntheticPoseSource};
use physio_core::{CoreConfig, Movement, MovementAnalyzer, Side, ThresholdStore};

#[derive(Parser, Debug)]
#[command(name = "physio_core")]
#[command(author, version, about = "Measure a movement and report confirmed compensatory errors")]
struct Args {
    /// Movement to measure (e.g. elbow_flexion)
    #[arg(short, long, default_value = "elbow_flexion")]
    movement: Movement,

    /// Side of the body (left/right)
    #[arg(short, long, default_value = "left")]
    side: Side,

    /// CSV landmark recording to replay; a synthetic subject is used otherwise
    #[arg(short, long)]
    recording: Option<PathBuf>,

    /// Frames to generate for the synthetic subject
    #[arg(long, default_value_t = 300)]
    frames: usize,

    /// Shoulder hike in metres injected into the synthetic subject
    #[arg(long, default_value_t = 0.0)]
    hike: f64,

    /// Threshold table (JSON); clinical defaults otherwise
    #[arg(short, long)]
    thresholds: Option<PathBuf>,

    /// Core config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Patient profile (JSON) used to derive adaptive settings
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Output directory for the session export
    #[arg(short, long, default_value = "./output")]
    output: PathBuf,
}

fn load_profile(path: &Path) -> Result<PatientProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid patient profile {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CoreConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => CoreConfig::default(),
    };

    if let Some(path) = &args.profile {
        let profile = load_profile(path)?;
        let settings = get_comprehensive_adaptive_settings(
            &profile,
            &EnvironmentConditions::default(),
            &LightingAssessment::default(),
        );
        info!(tier = ?settings.tier, min_confidence = settings.min_confidence, "adaptive settings selected");
        config.min_landmark_visibility = settings.min_confidence;
    }

    let store = match &args.thresholds {
        Some(path) => ThresholdStore::load(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => ThresholdStore::new(),
    };

    let mut source: Box<dyn PoseSource> = match &args.recording {
        Some(path) => Box::new(RecordedPoseSource::open(path)?),
        None => Box::new(
            SyntheticPoseSource::new(args.movement, args.side, args.frames).with_shoulder_hike(args.hike),
        ),
    };

    info!(
        source = source.name(),
        movement = %args.movement,
        side = %args.side,
        "starting session"
    );

    let mut analyzer = MovementAnalyzer::new(&config);
    let mut exporter = SessionExporter::new(&args.output, None);
    // One snapshot per session; edits made elsewhere never tear a frame
    let thresholds = store.snapshot();

    while let Some(frame) = source.next_frame()? {
        let report = analyzer.analyze(&frame, args.movement, args.side, &thresholds);
        exporter.add_frame(report);
    }

    if exporter.is_empty() {
        warn!("pose source produced no frames");
        return Ok(());
    }

    let csv_path = exporter.export_csv()?;
    let summary_path = exporter.export_summary()?;
    let summary = exporter.summary();

    println!("Session: {}", summary.session_name);
    println!("  frames measured: {}/{}", summary.measured_frames, summary.total_frames);
    if let (Some(mean), Some(max)) = (summary.mean_angle, summary.max_angle) {
        println!("  angle: mean {:.1}°, max {:.1}°", mean, max);
    }
    for (key, frames) in &summary.confirmed_error_frames {
        println!("  confirmed {}: {} frames", key, frames);
    }
    println!("  wrote {}", csv_path.display());
    println!("  wrote {}", summary_path.display());

    Ok(())
}
