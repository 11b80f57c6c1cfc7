//! attendance_scanner - mark attendance from ID-card barcodes.
//!
//! This binary:
//! 1. Loads configuration (file, environment, flags)
//! 2. Loads the student roster
//! 3. Opens (or creates) the attendance log
//! 4. Connects to the camera
//! 5. Runs the scan loop until `q`, Ctrl-C, or the end of the source

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use attendance_scanner::ingest::SourceKind;
use attendance_scanner::{
    Annotator, CameraSource, ConfigOverrides, Controls, CsvAttendanceLog, DecodePipeline,
    FrameSource, QrDecoder, Roster, ScanLoop, ScannerConfig, Scanner, SnapshotWriter,
};

#[derive(Parser, Debug)]
#[command(
    name = "attendance_scanner",
    about = "Scan ID-card barcodes and log attendance to CSV"
)]
struct Args {
    /// Roster CSV with `regno` and `name` columns
    #[arg(long, value_name = "PATH")]
    roster: Option<PathBuf>,

    /// Attendance log CSV (created with a header if missing)
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Camera: device index, /dev/videoN, http(s) URL, stub://name, or image path
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Seconds before the same code is logged again
    #[arg(long, value_name = "SECS")]
    cooldown: Option<f64>,

    /// Write annotated frames with new detections here
    #[arg(long, value_name = "DIR")]
    snapshot_dir: Option<PathBuf>,

    /// TrueType font for labels on snapshots
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Ignore terminal keys; stop only on Ctrl-C or end of source
    #[arg(long)]
    no_keys: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            roster_path: self.roster.clone(),
            log_path: self.log.clone(),
            source: self.source.clone(),
            cooldown_secs: self.cooldown,
            snapshot_dir: self.snapshot_dir.clone(),
            font_path: self.font.clone(),
            max_frames: self.max_frames,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = ScannerConfig::load_with(&args.overrides())?;

    let roster = Roster::load(&cfg.roster_path)?;
    let attendance_log = CsvAttendanceLog::open(&cfg.log_path)?;
    log::info!("attendance log: {}", cfg.log_path.display());

    if SourceKind::classify(&cfg.source.url)? == SourceKind::Synthetic {
        log::warn!(
            "scanning synthetic frames from {}; pass --source to use a camera",
            cfg.source.url
        );
    }
    let mut source = CameraSource::new(cfg.source.clone())?;
    source
        .connect()
        .with_context(|| format!("could not open camera {}", cfg.source.url))?;

    let pipeline = DecodePipeline::new(
        QrDecoder::new().with_max_dimension(cfg.qr_max_dimension),
        cfg.enhancement,
    );
    log::info!(
        "decoder={} contrast={:.1} brightness={:.0} cooldown={:?}",
        pipeline.backend_name(),
        cfg.enhancement.contrast,
        cfg.enhancement.brightness,
        cfg.cooldown
    );

    let controls = if args.no_keys {
        Controls::headless().with_ctrlc()?
    } else {
        Controls::interactive()?
    };

    let mut annotator = Annotator::new();
    if let Some(path) = &cfg.font_path {
        annotator = annotator.with_font_file(path)?;
    }

    let scanner = Scanner::new(roster, attendance_log, cfg.cooldown);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, controls)
        .with_annotator(annotator)
        .with_max_frames(cfg.max_frames);
    if let Some(dir) = &cfg.snapshot_dir {
        scan_loop = scan_loop.with_snapshots(SnapshotWriter::create(dir)?);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = scan_loop.run(&mut out)?;
    log::info!(
        "{} record(s) appended to {}",
        scan_loop.scanner().sink().rows_appended(),
        scan_loop.scanner().sink().path().display()
    );
    log::debug!("frames={} snapshots={}", summary.frames, summary.snapshots);
    Ok(())
}
