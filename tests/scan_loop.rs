use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};

use attendance_scanner::decode::Point;
use attendance_scanner::ingest::SourceStats;
use attendance_scanner::{
    AttendanceRecord, AttendanceSink, BarcodeDecoder, Capture, Controls, DecodePipeline,
    DecodedCandidate, Enhancement, Frame, FrameSource, InMemoryAttendanceLog, Roster, ScanLoop,
    Scanner, SnapshotWriter, DEFAULT_COOLDOWN,
};

/// Replays a fixed list of captures, then ends.
struct ScriptedSource {
    captures: VecDeque<Capture>,
    delivered: u64,
    released: Arc<AtomicBool>,
}

impl ScriptedSource {
    fn new(captures: Vec<Capture>) -> Self {
        Self {
            captures: captures.into(),
            delivered: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        let capture = self.captures.pop_front().unwrap_or(Capture::Ended);
        if matches!(capture, Capture::Frame(_)) {
            self.delivered += 1;
        }
        Ok(capture)
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.delivered,
            source: "scripted".to_string(),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Frames are told apart by width; each width maps to what the "decoder" sees.
struct WidthKeyedDecoder {
    texts: HashMap<u32, Vec<&'static str>>,
    failing_width: Option<u32>,
}

impl BarcodeDecoder for WidthKeyedDecoder {
    fn name(&self) -> &'static str {
        "width-keyed"
    }

    fn decode(&mut self, image: &GrayImage) -> Result<Vec<DecodedCandidate>> {
        if Some(image.width()) == self.failing_width {
            return Err(anyhow!("corrupt symbol"));
        }
        Ok(self
            .texts
            .get(&image.width())
            .map(|texts| {
                texts
                    .iter()
                    .map(|text| {
                        DecodedCandidate::new(
                            *text,
                            vec![
                                Point::new(4, 10),
                                Point::new(24, 10),
                                Point::new(24, 28),
                                Point::new(4, 28),
                            ],
                        )
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

struct FailingSink;

impl AttendanceSink for FailingSink {
    fn append(&mut self, _record: &AttendanceRecord) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    fn location(&self) -> String {
        "failing".to_string()
    }
}

fn frame(width: u32, index: u64) -> Capture {
    Capture::Frame(Frame::new(RgbImage::new(width, 32), index))
}

fn roster() -> Roster {
    Roster::from_entries([("23BCS0022", "Asha")])
}

fn decoder(texts: &[(u32, &'static str)]) -> WidthKeyedDecoder {
    let mut map: HashMap<u32, Vec<&'static str>> = HashMap::new();
    for (width, text) in texts {
        map.entry(*width).or_default().push(*text);
    }
    WidthKeyedDecoder {
        texts: map,
        failing_width: None,
    }
}

#[test]
fn scripted_session_prints_one_row_per_event() -> Result<()> {
    let snapshots = tempfile::tempdir()?;
    let source = ScriptedSource::new(vec![
        frame(40, 1),
        Capture::Empty,
        frame(41, 2),
        frame(42, 3),
        frame(43, 4),
        frame(44, 5),
    ]);
    let released = source.released.clone();
    let pipeline = DecodePipeline::new(
        decoder(&[
            (40, "ID:23BCS0022;"),
            (41, "ID:23BCS0022;"),
            (42, "23XYZ0099"),
            (44, "garbage-text"),
        ]),
        Enhancement::default(),
    );
    let scanner = Scanner::new(roster(), InMemoryAttendanceLog::new(), DEFAULT_COOLDOWN);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, Controls::headless())
        .with_snapshots(SnapshotWriter::create(snapshots.path())?);

    let mut out = Vec::new();
    let summary = scan_loop.run(&mut out)?;
    let out = String::from_utf8(out)?;
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[2], "REG NO, NAME, STATUS, TIMESTAMP");
    assert!(lines[3].starts_with("23BCS0022, Asha, ✓ PRESENT, "));
    assert_eq!(lines[4], "23XYZ0099, Not in Database, INVALID (Not in DB), ---");
    assert_eq!(lines[5], "garbage-text, Invalid Format, INVALID (Bad Format), ---");
    assert!(lines[6].is_empty());
    assert!(lines[7].starts_with("Scanned 5 frame(s) from scripted"));

    assert_eq!(summary.frames, 5);
    assert_eq!(summary.frames_with_candidates, 4);
    assert_eq!(summary.scan.present, 1);
    assert_eq!(summary.scan.suppressed, 1);
    assert_eq!(summary.scan.not_in_roster, 1);
    assert_eq!(summary.scan.bad_format, 1);
    assert_eq!(summary.snapshots, 3);
    assert!(snapshots.path().join("frame_000001.png").exists());
    assert!(!snapshots.path().join("frame_000002.png").exists());
    assert!(snapshots.path().join("frame_000005.png").exists());

    assert_eq!(scan_loop.scanner().sink().records().len(), 1);
    assert!(released.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn decode_errors_skip_the_frame() -> Result<()> {
    let source = ScriptedSource::new(vec![frame(50, 1), frame(40, 2)]);
    let mut backend = decoder(&[(40, "23BCS0022")]);
    backend.failing_width = Some(50);
    let pipeline = DecodePipeline::new(backend, Enhancement::default());
    let scanner = Scanner::new(roster(), InMemoryAttendanceLog::new(), DEFAULT_COOLDOWN);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, Controls::headless());

    let summary = scan_loop.run(&mut Vec::new())?;
    assert_eq!(summary.decode_failures, 1);
    assert_eq!(summary.scan.present, 1);
    Ok(())
}

#[test]
fn quit_key_stops_before_reading_and_keeps_adjustments() -> Result<()> {
    let (tx, rx) = mpsc::channel();
    for key in [']', '+', 'q'] {
        tx.send(key)?;
    }
    let source = ScriptedSource::new(vec![frame(40, 1)]);
    let pipeline = DecodePipeline::new(decoder(&[]), Enhancement::default());
    let scanner = Scanner::new(roster(), InMemoryAttendanceLog::new(), DEFAULT_COOLDOWN);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, Controls::from_channel(rx));

    let summary = scan_loop.run(&mut Vec::new())?;
    assert_eq!(summary.frames, 0);
    let enhancement = scan_loop.pipeline().enhancement;
    assert!((enhancement.contrast - 1.6).abs() < 1e-5);
    assert_eq!(enhancement.brightness, 15.0);
    Ok(())
}

#[test]
fn quit_flag_and_frame_limit_stop_the_loop() -> Result<()> {
    let source = ScriptedSource::new((1..=10).map(|i| frame(40, i)).collect());
    let pipeline = DecodePipeline::new(decoder(&[]), Enhancement::default());
    let scanner = Scanner::new(roster(), InMemoryAttendanceLog::new(), DEFAULT_COOLDOWN);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, Controls::headless())
        .with_max_frames(Some(3));
    assert_eq!(scan_loop.run(&mut Vec::new())?.frames, 3);

    let controls = Controls::headless();
    controls.quit_flag().store(true, Ordering::SeqCst);
    let source = ScriptedSource::new(vec![frame(40, 1)]);
    let pipeline = DecodePipeline::new(decoder(&[]), Enhancement::default());
    let scanner = Scanner::new(roster(), InMemoryAttendanceLog::new(), DEFAULT_COOLDOWN);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, controls);
    assert_eq!(scan_loop.run(&mut Vec::new())?.frames, 0);
    Ok(())
}

#[test]
fn sink_failure_releases_source_and_propagates() -> Result<()> {
    let source = ScriptedSource::new(vec![frame(40, 1), frame(41, 2)]);
    let released = source.released.clone();
    let pipeline = DecodePipeline::new(decoder(&[(40, "23BCS0022")]), Enhancement::default());
    let scanner = Scanner::new(roster(), FailingSink, DEFAULT_COOLDOWN);
    let mut scan_loop = ScanLoop::new(source, pipeline, scanner, Controls::headless());

    let mut out = Vec::new();
    let err = scan_loop.run(&mut out).unwrap_err();
    assert!(format!("{:#}", err).contains("disk full"));
    assert!(released.load(Ordering::SeqCst));
    assert!(String::from_utf8(out)?.contains("Scanned 1 frame(s)"));
    Ok(())
}
