use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::record::AttendanceRecord;

/// Column header of the attendance log.
pub const LOG_HEADER: [&str; 8] = [
    "regno", "name", "date", "day", "month", "year", "time", "period",
];

/// Append-only destination for attendance records.
pub trait AttendanceSink {
    fn append(&mut self, record: &AttendanceRecord) -> Result<()>;

    /// Human-readable location, for logs and the shutdown summary.
    fn location(&self) -> String;
}

/// CSV attendance log on the local filesystem.
///
/// The file is created with `LOG_HEADER` when absent or empty; existing rows
/// are never rewritten. Each append is flushed before returning.
pub struct CsvAttendanceLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_appended: u64,
}

impl CsvAttendanceLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("open attendance log {}", path.display()))?;

        let len = file
            .metadata()
            .with_context(|| format!("stat attendance log {}", path.display()))?
            .len();

        if len == 0 {
            file.write_all(format!("{}\n", LOG_HEADER.join(",")).as_bytes())
                .with_context(|| format!("write header to {}", path.display()))?;
            log::info!("created attendance log {}", path.display());
        } else {
            check_header(&path)?;
            if !ends_with_newline(&mut file)? {
                file.write_all(b"\n")
                    .with_context(|| format!("terminate last row of {}", path.display()))?;
            }
            log::info!("appending to existing attendance log {}", path.display());
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        Ok(Self {
            path,
            writer,
            rows_appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this handle (not counting rows already in the file).
    pub fn rows_appended(&self) -> u64 {
        self.rows_appended
    }
}

impl AttendanceSink for CsvAttendanceLog {
    fn append(&mut self, record: &AttendanceRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .with_context(|| format!("append to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        self.rows_appended += 1;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Records held in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryAttendanceLog {
    records: Vec<AttendanceRecord>,
}

impl InMemoryAttendanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }
}

impl AttendanceSink for InMemoryAttendanceLog {
    fn append(&mut self, record: &AttendanceRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Parse an attendance log back into records.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<AttendanceRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open attendance log {}", path.display()))?;
    validate_header(reader.headers()?, path)?;

    let mut records = Vec::new();
    for (row, result) in reader.deserialize().enumerate() {
        let record: AttendanceRecord =
            result.with_context(|| format!("parse {} row {}", path.display(), row + 2))?;
        records.push(record);
    }
    Ok(records)
}

fn check_header(path: &Path) -> Result<()> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open attendance log {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?;
    validate_header(headers, path)
}

fn validate_header(headers: &csv::StringRecord, path: &Path) -> Result<()> {
    let found: Vec<&str> = headers.iter().map(|h| h.trim()).collect();
    if found != LOG_HEADER {
        return Err(anyhow!(
            "{} has header [{}], expected [{}]",
            path.display(),
            found.join(","),
            LOG_HEADER.join(",")
        ));
    }
    Ok(())
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    file.seek(SeekFrom::End(-1)).context("seek attendance log")?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).context("read attendance log")?;
    Ok(last[0] == b'\n')
}
