//! Attendance Scanner
//!
//! Reads frames from a camera, decodes ID-card symbols, matches the
//! registration number against a roster and appends one timestamped row per
//! student to a CSV attendance log.
//!
//! # Pipeline
//!
//! 1. **Ingest**: a `FrameSource` yields `Capture`s (synthetic, image files,
//!    HTTP MJPEG, V4L2).
//! 2. **Decode**: intensity → gain/offset → decode, with an Otsu threshold
//!    retry when the first pass finds nothing.
//! 3. **Match**: extract the `NNLLLNNNN` registration number and look it up.
//! 4. **Gate**: a single last-key/last-time cell suppresses repeats inside the
//!    cooldown window.
//! 5. **Log**: append an `AttendanceRecord` and flush.
//! 6. **Annotate**: outline and label the symbol; optionally snapshot.
//!
//! # Module Structure
//!
//! - `frame`, `ingest`: frames and where they come from
//! - `enhance`, `decode`: preprocessing and the `BarcodeDecoder` backends
//! - `regno`, `roster`, `gate`, `scanner`: identification and debounce
//! - `record`, `storage`: the attendance log
//! - `render`, `controls`, `runtime`: the interactive loop
//! - `config`: defaults, config file, environment, CLI overrides
//! - `vision`, `stream`: standalone and live-frame transforms for the
//!   `cvdemo` binary

pub mod config;
pub mod controls;
pub mod decode;
pub mod enhance;
pub mod frame;
pub mod gate;
pub mod ingest;
pub mod record;
pub mod regno;
pub mod render;
pub mod roster;
pub mod runtime;
pub mod scanner;
pub mod storage;
pub mod stream;
pub mod vision;

pub use config::{ConfigOverrides, ScannerConfig};
pub use controls::{Command, Controls};
pub use decode::{BarcodeDecoder, DecodePipeline, DecodedCandidate, QrDecoder};
pub use enhance::Enhancement;
pub use frame::{Capture, Frame};
pub use gate::{DebounceGate, DEFAULT_COOLDOWN};
pub use ingest::{CameraSource, FrameSource, SourceConfig};
pub use record::AttendanceRecord;
pub use regno::extract_regno;
pub use render::{Annotator, SnapshotWriter};
pub use roster::{Roster, RosterLookup};
pub use runtime::{RunSummary, ScanLoop};
pub use scanner::{Observation, ScanOutcome, Scanner, Verdict};
pub use storage::{read_log, AttendanceSink, CsvAttendanceLog, InMemoryAttendanceLog};
pub use stream::{FrameStream, StreamSummary, StreamTransform};
