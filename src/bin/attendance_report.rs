//! attendance_report - check and summarize an attendance log.
//!
//! Every row must parse back into a wall-clock timestamp whose weekday
//! matches the `day` column. Valid rows are grouped by calendar date.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::IsTerminal;
use std::path::PathBuf;

use attendance_scanner::read_log;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "attendance_report",
    about = "Verify an attendance log and print per-day totals"
)]
struct Args {
    /// Attendance log CSV
    #[arg(long, env = "ATTENDANCE_LOG", default_value = "attendance_log.csv")]
    log: PathBuf,

    /// List the registration numbers seen on each day
    #[arg(short, long)]
    verbose: bool,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", value_parser = ui::UiMode::parse)]
    ui: ui::UiMode,
}

#[derive(Debug, Default, Serialize)]
struct DaySummary {
    rows: usize,
    students: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    log: String,
    rows: usize,
    invalid_rows: Vec<usize>,
    days: BTreeMap<NaiveDate, DaySummary>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let records = {
        let mut stage = ui.stage("Read log");
        let records = read_log(&args.log)?;
        stage.detail(format!("{} row(s)", records.len()));
        records
    };

    let mut report = Report {
        log: args.log.display().to_string(),
        rows: records.len(),
        invalid_rows: Vec::new(),
        days: BTreeMap::new(),
    };
    {
        let _stage = ui.stage("Check timestamps");
        for (i, record) in records.iter().enumerate() {
            // Row 1 is the header.
            let row = i + 2;
            match record.observed_at() {
                Ok(at) => {
                    let day = report.days.entry(at.date()).or_default();
                    day.rows += 1;
                    day.students.insert(record.regno.clone());
                }
                Err(err) => {
                    log::warn!("row {}: {:#}", row, err);
                    report.invalid_rows.push(row);
                }
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("attendance_report: {}", report.log);
        println!();
        for (date, day) in &report.days {
            println!(
                "  {}  {:>4} row(s)  {:>4} student(s)",
                date.format("%Y-%m-%d %a"),
                day.rows,
                day.students.len()
            );
            if args.verbose {
                for regno in &day.students {
                    println!("      {}", regno);
                }
            }
        }
        println!();
        println!(
            "{} row(s), {} day(s), {} invalid",
            report.rows,
            report.days.len(),
            report.invalid_rows.len()
        );
    }

    if !report.invalid_rows.is_empty() {
        return Err(anyhow!(
            "{} row(s) failed timestamp checks",
            report.invalid_rows.len()
        ));
    }
    Ok(())
}
