use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::NaiveDate;
use tempfile::tempdir;

use attendance_scanner::{
    read_log, CsvAttendanceLog, Observation, Roster, ScanOutcome, Scanner, DEFAULT_COOLDOWN,
};

fn start() -> Observation {
    let wall = NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    Observation::at(Instant::now(), wall)
}

fn write_roster(dir: &std::path::Path) -> Result<std::path::PathBuf> {
    let path = dir.join("students.csv");
    std::fs::write(
        &path,
        "RegNo , Name, Section\n23bcs0022,Asha,A\n23BCS0101, Ravi Kumar ,B\n",
    )?;
    Ok(path)
}

#[test]
fn repeated_scans_log_once_per_window() -> Result<()> {
    let dir = tempdir()?;
    let roster = Roster::load(write_roster(dir.path())?)?;
    let log_path = dir.path().join("attendance_log.csv");
    let mut scanner = Scanner::new(roster, CsvAttendanceLog::open(&log_path)?, DEFAULT_COOLDOWN);

    let t0 = start();
    for offset_ms in [0, 300, 900] {
        scanner.observe("ID:23BCS0022;", &t0.after(Duration::from_millis(offset_ms)))?;
    }
    let again = scanner.observe("ID:23BCS0022;", &t0.after(Duration::from_secs(4)))?;
    assert!(matches!(again, ScanOutcome::Present { .. }));

    let records = read_log(&log_path)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].regno, "23BCS0022");
    assert_eq!(records[0].name, "Asha");
    assert_eq!(records[0].composed_timestamp(), "05-Tuesday-March-2024 09:15:00 AM");
    assert_eq!(records[1].time, "09:15:04");
    assert_eq!(records[1].observed_at()?, t0.wall + chrono::Duration::seconds(4));
    Ok(())
}

#[test]
fn unknown_and_malformed_codes_write_nothing() -> Result<()> {
    let dir = tempdir()?;
    let roster = Roster::load(write_roster(dir.path())?)?;
    let log_path = dir.path().join("attendance_log.csv");
    let mut scanner = Scanner::new(roster, CsvAttendanceLog::open(&log_path)?, DEFAULT_COOLDOWN);

    let t0 = start();
    let unknown = scanner.observe("23XYZ0099", &t0)?;
    assert_eq!(
        unknown.console_row().as_deref(),
        Some("23XYZ0099, Not in Database, INVALID (Not in DB), ---")
    );
    let garbage = scanner.observe("garbage-text", &t0.after(Duration::from_millis(10)))?;
    assert_eq!(
        garbage.console_row().as_deref(),
        Some("garbage-text, Invalid Format, INVALID (Bad Format), ---")
    );

    assert!(read_log(&log_path)?.is_empty());
    let stats = scanner.stats();
    assert_eq!((stats.present, stats.not_in_roster, stats.bad_format), (0, 1, 1));
    Ok(())
}

#[test]
fn reopening_appends_below_existing_rows() -> Result<()> {
    let dir = tempdir()?;
    let roster_path = write_roster(dir.path())?;
    let log_path = dir.path().join("attendance_log.csv");
    let t0 = start();

    {
        let mut scanner = Scanner::new(
            Roster::load(&roster_path)?,
            CsvAttendanceLog::open(&log_path)?,
            DEFAULT_COOLDOWN,
        );
        scanner.observe("23BCS0022", &t0)?;
    }
    {
        let mut scanner = Scanner::new(
            Roster::load(&roster_path)?,
            CsvAttendanceLog::open(&log_path)?,
            DEFAULT_COOLDOWN,
        );
        scanner.observe("23bcs0101", &t0.after(Duration::from_secs(60)))?;
        assert_eq!(scanner.sink().rows_appended(), 1);
    }

    let raw = std::fs::read_to_string(&log_path)?;
    assert_eq!(raw.matches("regno,name").count(), 1);
    let records = read_log(&log_path)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].regno, "23BCS0101");
    assert_eq!(records[1].name, "Ravi Kumar");
    assert_eq!(records[1].time, "09:16:00");
    Ok(())
}

#[test]
fn foreign_csv_is_not_used_as_a_log() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("other.csv");
    std::fs::write(&path, "id,value\n1,2\n")?;
    assert!(CsvAttendanceLog::open(&path).is_err());
    assert!(read_log(&path).is_err());
    Ok(())
}

#[test]
fn roster_without_name_column_fails_to_load() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("students.csv");
    std::fs::write(&path, "regno,section\n23BCS0022,A\n")?;
    assert!(Roster::load(&path).is_err());
    assert!(Roster::load(dir.path().join("missing.csv")).is_err());
    Ok(())
}
