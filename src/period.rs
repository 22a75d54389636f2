//! Report period selection from `--year`, `--month` and `--day`.

use crate::config::ConfigError;
use chrono::{Datelike, Days, NaiveDate, TimeZone};
use rscp_client::{ClientError, HistoryRange};
use serde::Serialize;

/// Oldest and newest year a history report may ask for.
pub const MIN_YEAR: i32 = 2012;
pub const MAX_YEAR: i32 = 2032;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Year,
    Month,
    Day,
}

/// Raw period flags as given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodArgs {
    /// Absolute year.
    pub year: Option<i32>,
    /// 1-12, or a negative offset from the current month.
    pub month: Option<i32>,
    /// Day of month, or zero/negative offset from today.
    pub day: Option<i32>,
}

/// Resolved report period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub kind: ReportKind,
    /// First day covered by the report.
    pub start: NaiveDate,
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, ConfigError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| invalid(format!("invalid month {}-{:02}", year, month)))
}

/// Same day in another month, clamped to that month's last day.
fn clamped_day(year: i32, month: u32, day: u32) -> Result<NaiveDate, ConfigError> {
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        return Ok(date);
    }
    let next = if month == 12 {
        first_of_month(year + 1, 1)?
    } else {
        first_of_month(year, month + 1)?
    };
    next.pred_opt()
        .ok_or_else(|| invalid(format!("invalid month {}-{:02}", year, month)))
}

impl Period {
    /// Resolves the flags against `today`.
    ///
    /// Only a year gives a year report, a month without day a month report,
    /// anything else a day report. The period must not start after `today`.
    pub fn resolve(args: &PeriodArgs, today: NaiveDate) -> Result<Self, ConfigError> {
        let mut year = today.year();
        let mut month = today.month();

        if let Some(y) = args.year {
            if !(MIN_YEAR..=MAX_YEAR).contains(&y) {
                return Err(invalid(format!(
                    "invalid year {} (expected {}-{})",
                    y, MIN_YEAR, MAX_YEAR
                )));
            }
            year = y;
        }

        if let Some(m) = args.month {
            match m {
                1..=12 => month = m as u32,
                m if m < 0 => {
                    let total = year * 12 + month as i32 - 1 + m;
                    year = total.div_euclid(12);
                    month = total.rem_euclid(12) as u32 + 1;
                }
                m => return Err(invalid(format!("invalid month {}", m))),
            }
        }

        let kind = match (args.year, args.month, args.day) {
            (Some(_), None, None) => ReportKind::Year,
            (_, Some(_), None) => ReportKind::Month,
            _ => ReportKind::Day,
        };

        let start = match kind {
            ReportKind::Year => first_of_month(year, 1)?,
            ReportKind::Month => first_of_month(year, month)?,
            ReportKind::Day => match args.day.unwrap_or(0) {
                d if d > 0 => NaiveDate::from_ymd_opt(year, month, d as u32)
                    .ok_or_else(|| invalid(format!("invalid day {}-{:02}-{:02}", year, month, d)))?,
                d => clamped_day(year, month, today.day())?
                    .checked_sub_days(Days::new(u64::from(d.unsigned_abs())))
                    .ok_or_else(|| invalid(format!("day offset {} out of range", d)))?,
            },
        };

        if start > today {
            return Err(invalid(format!("report date {} is in the future", start)));
        }

        Ok(Self { kind, start })
    }

    /// History query window in `tz`.
    pub fn range<Tz: TimeZone>(&self, tz: &Tz, brief: bool) -> Result<HistoryRange, ClientError> {
        match self.kind {
            ReportKind::Year => HistoryRange::year(tz, self.start.year()),
            ReportKind::Month => {
                HistoryRange::month(tz, self.start.year(), self.start.month(), brief)
            }
            ReportKind::Day => HistoryRange::day(tz, self.start, brief),
        }
    }
}
