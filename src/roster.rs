//! Student roster: registration number → display name.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

const REGNO_COLUMN: &str = "regno";
const NAME_COLUMN: &str = "name";

/// Narrow lookup interface used by the scanner.
pub trait RosterLookup {
    fn lookup(&self, regno: &str) -> Option<&str>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Roster loaded once at startup and never modified.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    entries: HashMap<String, String>,
}

impl Roster {
    /// Load a CSV roster with `regno` and `name` columns.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("open roster {}", path.display()))?;
        let roster =
            Self::from_reader(file).with_context(|| format!("load roster {}", path.display()))?;
        log::info!("loaded {} students from {}", roster.len(), path.display());
        Ok(roster)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv.headers().context("read roster header")?.clone();
        let column = |wanted: &str| {
            headers.iter().position(|h| {
                h.trim_start_matches('\u{feff}')
                    .trim()
                    .eq_ignore_ascii_case(wanted)
            })
        };
        let found = || headers.iter().collect::<Vec<_>>().join(", ");
        let regno_idx = column(REGNO_COLUMN)
            .ok_or_else(|| anyhow!("roster is missing column '{}' (found: {})", REGNO_COLUMN, found()))?;
        let name_idx = column(NAME_COLUMN)
            .ok_or_else(|| anyhow!("roster is missing column '{}' (found: {})", NAME_COLUMN, found()))?;

        let mut entries = HashMap::new();
        for (row, record) in csv.records().enumerate() {
            let record = record.with_context(|| format!("parse roster row {}", row + 2))?;
            let regno = record.get(regno_idx).unwrap_or("").to_uppercase();
            if regno.is_empty() {
                log::warn!("roster row {} has no regno; skipped", row + 2);
                continue;
            }
            let name = record.get(name_idx).unwrap_or("").to_string();
            if entries.contains_key(&regno) {
                log::warn!("roster row {} repeats {}; keeping the first entry", row + 2, regno);
                continue;
            }
            entries.insert(regno, name);
        }

        Ok(Self { entries })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = HashMap::new();
        for (regno, name) in entries {
            map.entry(regno.into().trim().to_uppercase())
                .or_insert_with(|| name.into());
        }
        Self { entries: map }
    }
}

impl RosterLookup for Roster {
    fn lookup(&self, regno: &str) -> Option<&str> {
        self.entries
            .get(&regno.trim().to_uppercase())
            .map(String::as_str)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
