//! Period key validation at the API and CLI boundary.
//!
//! The core treats a period as an opaque string. Only the edges of the
//! system (request handlers, reports, the CLI) parse it, accepting either a
//! year (`2026`) or a quarter of a year (`Q1-2026`).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::{Error, Result};

pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

/// A parsed period key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKey {
    Year(i32),
    Quarter { quarter: u8, year: i32 },
}

impl PeriodKey {
    pub fn year(&self) -> i32 {
        match self {
            PeriodKey::Year(y) => *y,
            PeriodKey::Quarter { year, .. } => *year,
        }
    }

    /// The quarter containing `date`.
    pub fn quarter_of(date: NaiveDate) -> Self {
        PeriodKey::Quarter {
            quarter: (date.month0() / 3 + 1) as u8,
            year: date.year(),
        }
    }

    /// First day of the period.
    pub fn start_date(&self) -> Option<NaiveDate> {
        match self {
            PeriodKey::Year(y) => NaiveDate::from_ymd_opt(*y, 1, 1),
            PeriodKey::Quarter { quarter, year } => {
                NaiveDate::from_ymd_opt(*year, (*quarter as u32 - 1) * 3 + 1, 1)
            }
        }
    }

    /// Whole weeks between the start of the period and `today`, never negative.
    pub fn weeks_elapsed(&self, today: NaiveDate) -> i64 {
        match self.start_date() {
            Some(start) => ((today - start).num_days() / 7).max(0),
            None => 0,
        }
    }

    /// Every key that belongs to `year`: the year itself and its four quarters.
    pub fn keys_in_year(year: i32) -> Vec<String> {
        let mut keys = vec![PeriodKey::Year(year).to_string()];
        keys.extend((1..=4).map(|quarter| PeriodKey::Quarter { quarter, year }.to_string()));
        keys
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Year(y) => write!(f, "{}", y),
            PeriodKey::Quarter { quarter, year } => write!(f, "Q{}-{}", quarter, year),
        }
    }
}

fn parse_year(s: &str) -> Option<i32> {
    if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for PeriodKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "Invalid period '{}'. Use Q1-2026 or 2026 format.",
                s
            ))
        };

        let key = match s.strip_prefix('Q') {
            Some(rest) => {
                let (q, y) = rest.split_once('-').ok_or_else(invalid)?;
                let quarter = match q {
                    "1" => 1,
                    "2" => 2,
                    "3" => 3,
                    "4" => 4,
                    _ => return Err(invalid()),
                };
                let year = parse_year(y).ok_or_else(invalid)?;
                PeriodKey::Quarter { quarter, year }
            }
            None => PeriodKey::Year(parse_year(s).ok_or_else(invalid)?),
        };

        validate_year(key.year())?;
        Ok(key)
    }
}

pub fn validate_year(year: i32) -> Result<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "Year must be between {} and {}",
            MIN_YEAR, MAX_YEAR
        )))
    }
}

/// Validate a period key, returning it unchanged.
pub fn validate_period(s: &str) -> Result<String> {
    s.parse::<PeriodKey>().map(|k| k.to_string())
}

/// Parse a quarter key, rejecting bare years.
pub fn parse_quarter(s: &str) -> Result<PeriodKey> {
    match s.parse::<PeriodKey>() {
        Ok(key @ PeriodKey::Quarter { .. }) => Ok(key),
        Ok(PeriodKey::Year(_)) | Err(_) => Err(Error::InvalidArgument(
            "Invalid quarter format. Use Q1-2026 format.".to_string(),
        )),
    }
}
