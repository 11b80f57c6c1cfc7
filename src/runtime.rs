//! The scan loop.
//!
//! One thread does everything: read a frame, decode it, run each candidate
//! through the scanner, annotate, optionally snapshot, then poll the keys.
//! Console rows go to the writer passed to [`ScanLoop::run`]; diagnostics go
//! through `log`.

use anyhow::Result;
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::controls::{Command, Controls};
use crate::decode::{DecodePass, DecodePipeline};
use crate::frame::Capture;
use crate::ingest::{FrameSource, SourceStats};
use crate::render::{Annotator, SnapshotWriter};
use crate::roster::RosterLookup;
use crate::scanner::{Observation, ScanStats, Scanner, CONSOLE_HEADER};
use crate::storage::AttendanceSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Counters reported when the loop stops.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub frames: u64,
    pub frames_with_candidates: u64,
    pub decode_failures: u64,
    pub snapshots: u64,
    pub scan: ScanStats,
    pub source: SourceStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scanned {} frame(s) from {} ({} with symbols, {} decode failures)",
            self.frames, self.source.source, self.frames_with_candidates, self.decode_failures
        )?;
        write!(
            f,
            "Present: {} | Not in database: {} | Bad format: {} | Repeats suppressed: {} | Snapshots: {}",
            self.scan.present,
            self.scan.not_in_roster,
            self.scan.bad_format,
            self.scan.suppressed,
            self.snapshots
        )
    }
}

pub struct ScanLoop<F, R, S> {
    source: F,
    pipeline: DecodePipeline,
    scanner: Scanner<R, S>,
    controls: Controls,
    annotator: Annotator,
    snapshots: Option<SnapshotWriter>,
    max_frames: Option<u64>,
    frames: u64,
    frames_with_candidates: u64,
    decode_failures: u64,
}

impl<F: FrameSource, R: RosterLookup, S: AttendanceSink> ScanLoop<F, R, S> {
    /// `source` must already be connected.
    pub fn new(
        source: F,
        pipeline: DecodePipeline,
        scanner: Scanner<R, S>,
        controls: Controls,
    ) -> Self {
        Self {
            source,
            pipeline,
            scanner,
            controls,
            annotator: Annotator::new(),
            snapshots: None,
            max_frames: None,
            frames: 0,
            frames_with_candidates: 0,
            decode_failures: 0,
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotWriter) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn scanner(&self) -> &Scanner<R, S> {
        &self.scanner
    }

    pub fn pipeline(&self) -> &DecodePipeline {
        &self.pipeline
    }

    /// Run until quit, end of source, the frame limit, or an error.
    ///
    /// The source is released and the summary printed on every exit path.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<RunSummary> {
        writeln!(out, "ATTENDANCE SCANNER - Scan ID Card Barcode")?;
        writeln!(
            out,
            "Students: {} | Press 'q' then Enter to quit",
            self.scanner.roster().len()
        )?;
        writeln!(out, "{}", CONSOLE_HEADER)?;
        out.flush()?;

        let result = self.drive(out);
        self.source.release();
        let summary = self.summary();

        if let Err(err) = &result {
            log::error!("scan loop stopped: {:#}", err);
        }
        writeln!(out)?;
        writeln!(out, "{}", summary)?;
        out.flush()?;
        result.map(|()| summary)
    }

    fn drive<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let mut last_health_log = Instant::now();
        loop {
            if self.controls.quit_requested() {
                log::info!("shutdown requested");
                return Ok(());
            }
            for command in self.controls.poll() {
                if command == Command::Quit {
                    log::info!("quit key pressed");
                    return Ok(());
                }
                command.adjust(&mut self.pipeline.enhancement);
                log::info!(
                    "contrast={:.1} brightness={:.0}",
                    self.pipeline.enhancement.contrast,
                    self.pipeline.enhancement.brightness
                );
            }
            if let Some(max) = self.max_frames {
                if self.frames >= max {
                    log::info!("frame limit {} reached", max);
                    return Ok(());
                }
            }

            let mut frame = match self.source.next_frame()? {
                Capture::Frame(frame) => frame,
                Capture::Empty => continue,
                Capture::Ended => {
                    log::info!("source {} ended", self.source.stats().source);
                    return Ok(());
                }
            };
            self.frames += 1;

            let attempt = match self.pipeline.decode_frame(&frame) {
                Ok(attempt) => attempt,
                Err(err) => {
                    self.decode_failures += 1;
                    log::debug!("frame {}: decode failed: {:#}", frame.index, err);
                    continue;
                }
            };
            if !attempt.candidates.is_empty() {
                self.frames_with_candidates += 1;
                if let DecodePass::Thresholded { level } = attempt.pass {
                    log::debug!("frame {}: decoded after threshold at {}", frame.index, level);
                }
            }

            let at = Observation::now();
            let mut reported = false;
            for candidate in &attempt.candidates {
                let outcome = self.scanner.observe(&candidate.text, &at)?;
                if let Some(row) = outcome.console_row() {
                    writeln!(out, "{}", row)?;
                    reported = true;
                }
                self.annotator
                    .draw_candidate(frame.image_mut(), candidate, &outcome.verdict());
            }
            if reported {
                out.flush()?;
                if let Some(snapshots) = self.snapshots.as_mut() {
                    self.annotator
                        .draw_banner(frame.image_mut(), self.scanner.roster().len());
                    match snapshots.write(frame.image(), frame.index) {
                        Ok(path) => log::debug!("snapshot {}", path.display()),
                        Err(err) => log::warn!("snapshot skipped: {:#}", err),
                    }
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::info!(
                    "source health={} frames={} source={}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    stats.source
                );
                last_health_log = Instant::now();
            }
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frames,
            frames_with_candidates: self.frames_with_candidates,
            decode_failures: self.decode_failures,
            snapshots: self.snapshots.as_ref().map(|s| s.written()).unwrap_or(0),
            scan: self.scanner.stats(),
            source: self.source.stats(),
        }
    }
}
