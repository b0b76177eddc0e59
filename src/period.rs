// 📅 Settlement period - one calendar month, identified as YYYYMM

use crate::error::{Result, SettlementError};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || !(1000..=9999).contains(&year) {
            return Err(SettlementError::InvalidPeriod(format!("{}{:02}", year, month)));
        }
        Ok(Period { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        // year/month are validated in new()
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Following month; InvalidPeriod past 9999-12
    pub fn next(&self) -> Result<Period> {
        self.shift(|d| d.checked_add_months(Months::new(1)))
    }

    /// Preceding month; InvalidPeriod before 1000-01
    pub fn previous(&self) -> Result<Period> {
        self.shift(|d| d.checked_sub_months(Months::new(1)))
    }

    fn shift(&self, f: impl Fn(NaiveDate) -> Option<NaiveDate>) -> Result<Period> {
        match f(self.first_day()) {
            Some(d) => Period::new(d.year(), d.month()),
            None => Err(SettlementError::InvalidPeriod(self.to_string())),
        }
    }

    /// Tab name used by every workbook for this period
    pub fn tab_name(&self) -> String {
        self.to_string()
    }

    /// Label printed on settlement documents, e.g. "2024년 12월"
    pub fn label(&self) -> String {
        format!("{}년 {:02}월", self.year, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = SettlementError;

    /// Accepts "202412" and the document label form "2024년 12월"
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || SettlementError::InvalidPeriod(s.to_string());

        if s.len() == 6 && s.chars().all(|c| c.is_ascii_digit()) {
            let year = s[..4].parse().map_err(|_| invalid())?;
            let month = s[4..].parse().map_err(|_| invalid())?;
            return Period::new(year, month).map_err(|_| invalid());
        }

        if let Some((year_part, rest)) = s.split_once('년') {
            let month_part = rest.trim().strip_suffix('월').ok_or_else(invalid)?;
            let year_part = year_part.trim();
            if year_part.len() != 4 {
                return Err(invalid());
            }
            let year = year_part.parse().map_err(|_| invalid())?;
            let month = month_part.trim().parse().map_err(|_| invalid())?;
            return Period::new(year, month).map_err(|_| invalid());
        }

        Err(invalid())
    }
}

impl TryFrom<String> for Period {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> String {
        p.to_string()
    }
}
