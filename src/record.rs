//! Attendance records.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const PARSE_FORMAT: &str = "%d %B %Y %I:%M:%S %p";

/// One logged attendance event. Field order matches the log columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub regno: String,
    pub name: String,
    /// Day of month, two digits.
    pub date: String,
    /// Weekday name, e.g. `Monday`.
    pub day: String,
    /// Month name, e.g. `March`.
    pub month: String,
    pub year: String,
    /// 12-hour clock `HH:MM:SS`.
    pub time: String,
    /// `AM` or `PM`.
    pub period: String,
}

impl AttendanceRecord {
    /// Break a wall-clock instant into the log's calendar columns.
    pub fn stamp(regno: &str, name: &str, at: NaiveDateTime) -> Self {
        Self {
            regno: regno.to_string(),
            name: name.to_string(),
            date: at.format("%d").to_string(),
            day: at.format("%A").to_string(),
            month: at.format("%B").to_string(),
            year: at.format("%Y").to_string(),
            time: at.format("%I:%M:%S").to_string(),
            period: at.format("%p").to_string(),
        }
    }

    /// `DD-Weekday-Month-YYYY HH:MM:SS AM|PM`, as printed on the console.
    pub fn composed_timestamp(&self) -> String {
        format!(
            "{}-{}-{}-{} {} {}",
            self.date, self.day, self.month, self.year, self.time, self.period
        )
    }

    /// Reassemble the wall-clock instant from the calendar columns.
    ///
    /// The weekday column is redundant with the date and must agree with it.
    pub fn observed_at(&self) -> Result<NaiveDateTime> {
        let raw = format!(
            "{} {} {} {} {}",
            self.date, self.month, self.year, self.time, self.period
        );
        let at = NaiveDateTime::parse_from_str(&raw, PARSE_FORMAT)
            .with_context(|| format!("record for {} has bad timestamp '{}'", self.regno, raw))?;
        let weekday = at.format("%A").to_string();
        if weekday != self.day {
            return Err(anyhow!(
                "record for {} says {} but {} is a {}",
                self.regno,
                self.day,
                at.format("%Y-%m-%d"),
                weekday
            ));
        }
        Ok(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn stamp_splits_calendar_fields() {
        let record = AttendanceRecord::stamp("23BCS0022", "Asha", at(2024, 3, 5, 14, 7, 9));
        assert_eq!(record.date, "05");
        assert_eq!(record.day, "Tuesday");
        assert_eq!(record.month, "March");
        assert_eq!(record.year, "2024");
        assert_eq!(record.time, "02:07:09");
        assert_eq!(record.period, "PM");
        assert_eq!(
            record.composed_timestamp(),
            "05-Tuesday-March-2024 02:07:09 PM"
        );
    }

    #[test]
    fn observed_at_round_trips() {
        for when in [
            at(2024, 3, 5, 14, 7, 9),
            at(2025, 12, 31, 0, 0, 1),
            at(2023, 1, 1, 12, 30, 0),
        ] {
            let record = AttendanceRecord::stamp("23BCS0022", "Asha", when);
            assert_eq!(record.observed_at().unwrap(), when);
        }
    }

    #[test]
    fn observed_at_rejects_inconsistent_weekday() {
        let mut record = AttendanceRecord::stamp("23BCS0022", "Asha", at(2024, 3, 5, 9, 0, 0));
        record.day = "Friday".to_string();
        assert!(record.observed_at().is_err());
    }
}
