//! Per-candidate attendance decision.
//!
//! `Scanner` owns the roster, the log sink and the debounce gate. Each decoded
//! text goes through `observe`, which yields exactly one `ScanOutcome`:
//!
//! - `Present`: roster hit, record appended to the log
//! - `NotInRoster`: well-formed registration number that the roster lacks
//! - `BadFormat`: no registration number in the text
//! - `Suppressed`: same key as the last accepted event, inside the cooldown
//!
//! Only `Present` writes to the log. `Suppressed` prints nothing but still
//! carries a verdict so the frame can be annotated.

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use std::time::{Duration, Instant};

use crate::gate::DebounceGate;
use crate::record::AttendanceRecord;
use crate::regno::extract_regno;
use crate::roster::RosterLookup;
use crate::storage::AttendanceSink;

/// Console table header printed before the first row.
pub const CONSOLE_HEADER: &str = "REG NO, NAME, STATUS, TIMESTAMP";

const BAD_FORMAT_DISPLAY_CHARS: usize = 12;

/// When a candidate was seen: monotonic for the cooldown, wall clock for the record.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    pub instant: Instant,
    pub wall: NaiveDateTime,
}

impl Observation {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Local::now().naive_local(),
        }
    }

    pub fn at(instant: Instant, wall: NaiveDateTime) -> Self {
        Self { instant, wall }
    }

    /// The same observation shifted forward on both clocks.
    pub fn after(&self, elapsed: Duration) -> Self {
        let wall = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall);
        Self {
            instant: self.instant + elapsed,
            wall,
        }
    }
}

/// How a candidate should be drawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Valid { name: String },
    Unknown,
    BadFormat,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    Present { record: AttendanceRecord },
    NotInRoster { regno: String },
    BadFormat { display: String },
    Suppressed { key: String, verdict: Verdict },
}

impl ScanOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            ScanOutcome::Present { record } => Verdict::Valid {
                name: record.name.clone(),
            },
            ScanOutcome::NotInRoster { .. } => Verdict::Unknown,
            ScanOutcome::BadFormat { .. } => Verdict::BadFormat,
            ScanOutcome::Suppressed { verdict, .. } => verdict.clone(),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, ScanOutcome::Suppressed { .. })
    }

    /// Console line for this outcome; `None` for suppressed repeats.
    pub fn console_row(&self) -> Option<String> {
        match self {
            ScanOutcome::Present { record } => Some(format!(
                "{}, {}, ✓ PRESENT, {}",
                record.regno,
                record.name,
                record.composed_timestamp()
            )),
            ScanOutcome::NotInRoster { regno } => Some(format!(
                "{}, Not in Database, INVALID (Not in DB), ---",
                regno
            )),
            ScanOutcome::BadFormat { display } => Some(format!(
                "{}, Invalid Format, INVALID (Bad Format), ---",
                display
            )),
            ScanOutcome::Suppressed { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub present: u64,
    pub not_in_roster: u64,
    pub bad_format: u64,
    pub suppressed: u64,
}

pub struct Scanner<R, S> {
    roster: R,
    sink: S,
    gate: DebounceGate,
    stats: ScanStats,
}

impl<R: RosterLookup, S: AttendanceSink> Scanner<R, S> {
    pub fn new(roster: R, sink: S, cooldown: Duration) -> Self {
        Self {
            roster,
            sink,
            gate: DebounceGate::new(cooldown),
            stats: ScanStats::default(),
        }
    }

    /// Decide what one decoded text means and log it if it is a roster hit.
    ///
    /// The debounce key is the extracted registration number, or the full raw
    /// text when none was found. Errors come only from the log sink.
    pub fn observe(&mut self, raw_text: &str, at: &Observation) -> Result<ScanOutcome> {
        let regno = extract_regno(raw_text);
        let key = regno.as_deref().unwrap_or(raw_text);

        if self.gate.is_suppressed(key, at.instant) {
            let verdict = match regno.as_deref() {
                Some(id) => match self.roster.lookup(id) {
                    Some(name) => Verdict::Valid {
                        name: name.to_string(),
                    },
                    None => Verdict::Unknown,
                },
                None => Verdict::BadFormat,
            };
            self.stats.suppressed += 1;
            return Ok(ScanOutcome::Suppressed {
                key: key.to_string(),
                verdict,
            });
        }
        let Some(regno) = regno else {
            self.gate.admit(key, at.instant);
            self.stats.bad_format += 1;
            return Ok(ScanOutcome::BadFormat {
                display: raw_text.chars().take(BAD_FORMAT_DISPLAY_CHARS).collect(),
            });
        };

        match self.roster.lookup(&regno) {
            Some(name) => {
                let record = AttendanceRecord::stamp(&regno, name, at.wall);
                // A failed append leaves the gate open for the retry.
                self.sink.append(&record)?;
                self.gate.admit(&regno, at.instant);
                self.stats.present += 1;
                log::debug!("logged {} to {}", regno, self.sink.location());
                Ok(ScanOutcome::Present { record })
            }
            None => {
                self.gate.admit(&regno, at.instant);
                self.stats.not_in_roster += 1;
                Ok(ScanOutcome::NotInRoster { regno })
            }
        }
    }

    pub fn roster(&self) -> &R {
        &self.roster
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn gate(&self) -> &DebounceGate {
        &self.gate
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Roster;
    use crate::storage::InMemoryAttendanceLog;
    use chrono::NaiveDate;

    fn scanner() -> Scanner<Roster, InMemoryAttendanceLog> {
        Scanner::new(
            Roster::from_entries([("23BCS0022", "Asha")]),
            InMemoryAttendanceLog::new(),
            Duration::from_secs(3),
        )
    }

    fn start() -> Observation {
        let wall = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        Observation::at(Instant::now(), wall)
    }

    #[test]
    fn repeated_scans_log_once_per_window() -> Result<()> {
        let mut scanner = scanner();
        let t0 = start();

        let first = scanner.observe("ID:23BCS0022;", &t0)?;
        assert!(matches!(first, ScanOutcome::Present { .. }));
        let second = scanner.observe("ID:23BCS0022;", &t0.after(Duration::from_millis(400)))?;
        let third = scanner.observe("ID:23BCS0022;", &t0.after(Duration::from_millis(900)))?;
        assert!(second.is_suppressed());
        assert!(third.is_suppressed());
        assert_eq!(scanner.sink().records().len(), 1);

        let later = scanner.observe("ID:23BCS0022;", &t0.after(Duration::from_secs(4)))?;
        assert!(matches!(later, ScanOutcome::Present { .. }));
        assert_eq!(scanner.sink().records().len(), 2);
        assert_eq!(scanner.sink().records()[1].time, "09:15:04");

        let stats = scanner.stats();
        assert_eq!(stats.present, 2);
        assert_eq!(stats.suppressed, 2);
        Ok(())
    }

    #[test]
    fn unknown_regno_is_reported_not_logged() -> Result<()> {
        let mut scanner = scanner();
        let outcome = scanner.observe("23XYZ0099", &start())?;

        assert_eq!(
            outcome,
            ScanOutcome::NotInRoster {
                regno: "23XYZ0099".to_string()
            }
        );
        assert_eq!(
            outcome.console_row().unwrap(),
            "23XYZ0099, Not in Database, INVALID (Not in DB), ---"
        );
        assert!(scanner.sink().records().is_empty());
        Ok(())
    }

    #[test]
    fn bad_format_is_reported_and_truncated() -> Result<()> {
        let mut scanner = scanner();
        let outcome = scanner.observe("garbage-text", &start())?;
        assert_eq!(
            outcome.console_row().unwrap(),
            "garbage-text, Invalid Format, INVALID (Bad Format), ---"
        );

        let long = scanner.observe("https://example.com/badge", &start())?;
        assert_eq!(
            long,
            ScanOutcome::BadFormat {
                display: "https://exam".to_string()
            }
        );
        assert!(scanner.sink().records().is_empty());
        Ok(())
    }

    #[test]
    fn suppressed_repeat_keeps_verdict_and_prints_nothing() -> Result<()> {
        let mut scanner = scanner();
        let t0 = start();

        scanner.observe("23BCS0022", &t0)?;
        let repeat = scanner.observe("23BCS0022", &t0.after(Duration::from_secs(1)))?;
        assert_eq!(repeat.console_row(), None);
        assert_eq!(
            repeat.verdict(),
            Verdict::Valid {
                name: "Asha".to_string()
            }
        );

        scanner.observe("garbage", &t0.after(Duration::from_secs(2)))?;
        let bad_repeat = scanner.observe("garbage", &t0.after(Duration::from_millis(2500)))?;
        assert_eq!(bad_repeat.verdict(), Verdict::BadFormat);
        Ok(())
    }

    #[test]
    fn another_card_in_between_reopens_the_gate() -> Result<()> {
        let mut scanner = scanner();
        let t0 = start();

        scanner.observe("23BCS0022", &t0)?;
        scanner.observe("23XYZ0099", &t0.after(Duration::from_millis(500)))?;
        let back = scanner.observe("23BCS0022", &t0.after(Duration::from_secs(1)))?;
        assert!(matches!(back, ScanOutcome::Present { .. }));
        assert_eq!(scanner.sink().records().len(), 2);
        Ok(())
    }

    /// Fails the first `failures` appends, then keeps records.
    struct FlakySink {
        failures: usize,
        records: Vec<AttendanceRecord>,
    }

    impl AttendanceSink for FlakySink {
        fn append(&mut self, record: &AttendanceRecord) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(anyhow::anyhow!("disk full"));
            }
            self.records.push(record.clone());
            Ok(())
        }

        fn location(&self) -> String {
            "flaky".to_string()
        }
    }

    #[test]
    fn failed_append_does_not_arm_the_gate() -> Result<()> {
        let mut scanner = Scanner::new(
            Roster::from_entries([("23BCS0022", "Asha")]),
            FlakySink {
                failures: 1,
                records: Vec::new(),
            },
            Duration::from_secs(3),
        );
        let t0 = start();

        assert!(scanner.observe("23BCS0022", &t0).is_err());
        assert_eq!(scanner.gate().last_key(), None);

        let retry = scanner.observe("23BCS0022", &t0.after(Duration::from_millis(200)))?;
        assert!(matches!(retry, ScanOutcome::Present { .. }));
        assert_eq!(scanner.sink().records.len(), 1);
        assert_eq!(scanner.gate().last_key(), Some("23BCS0022"));
        Ok(())
    }

    #[test]
    fn present_row_uses_composed_timestamp() -> Result<()> {
        let mut scanner = scanner();
        let outcome = scanner.observe("23bcs0022", &start())?;
        assert_eq!(
            outcome.console_row().unwrap(),
            "23BCS0022, Asha, ✓ PRESENT, 05-Tuesday-March-2024 09:15:00 AM"
        );
        Ok(())
    }
}
