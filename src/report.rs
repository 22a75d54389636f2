//! Text and CSV report printer.

use chrono::TimeZone;
use rscp_client::{BatteryReading, HistoryKind, HistoryRange, HistoryRecord, PowerKind, ReportSink};
use rscp_protocol::{RscpErrorCode, Timestamp};
use std::fmt::Display;
use std::io::{self, Write};

pub const CSV_HEAD: &str = "date;batin;batout;batsoc;pro;netin;netout;con";

/// Label of a single value container.
pub fn value_prefix(kind: HistoryKind) -> &'static str {
    match kind {
        HistoryKind::Day => "Hour",
        HistoryKind::Month => "Day",
        HistoryKind::Year => "Month",
    }
}

/// Label of the sum container.
pub fn sum_prefix(kind: HistoryKind) -> &'static str {
    match kind {
        HistoryKind::Day => "Day",
        HistoryKind::Month => "Month",
        HistoryKind::Year => "Year",
    }
}

/// Day values are power samples, everything else energy.
fn unit(kind: HistoryKind) -> &'static str {
    match kind {
        HistoryKind::Day => "W",
        HistoryKind::Month | HistoryKind::Year => "Wh",
    }
}

fn csv_line(seconds: i64, record: &HistoryRecord) -> String {
    let v = |field: Option<f32>| field.unwrap_or(0.0);
    format!(
        "{};{:.2};{:.2};{:.2};{:.2};{:.2};{:.2};{:.2}",
        seconds,
        v(record.bat_power_in),
        v(record.bat_power_out),
        v(record.bat_charge_level),
        v(record.dc_power),
        v(record.grid_power_in),
        v(record.grid_power_out),
        v(record.consumption),
    )
}

/// Printable `(label, value)` pairs of the fields present in `record`.
fn field_lines(record: &HistoryRecord, unit: &str) -> Vec<(&'static str, String)> {
    let mut lines = Vec::new();
    let mut energy = |label, field: Option<f32>| {
        if let Some(v) = field {
            lines.push((label, format!("{:.1} {}", v, unit)));
        }
    };
    energy("battery in", record.bat_power_in);
    energy("battery out", record.bat_power_out);
    energy("production", record.dc_power);
    energy("grid in", record.grid_power_in);
    energy("grid out", record.grid_power_out);
    energy("consumption", record.consumption);
    energy("pm 0 power", record.pm0_power);
    energy("pm 1 power", record.pm1_power);

    if let Some(v) = record.graph_index {
        lines.insert(0, ("graph index", format!("{:.1}", v)));
    }
    if let Some(v) = record.bat_charge_level {
        lines.push(("bat charge level", format!("{:.1} %", v)));
    }
    if let Some(v) = record.bat_cycle_count {
        lines.push(("bat cycle count", format!("{:.0}", v)));
    }
    if let Some(v) = record.consumed_production {
        lines.push(("consumed production", format!("{:.1}", v)));
    }
    if let Some(v) = record.autarky {
        lines.push(("autarky", format!("{:.1}", v)));
    }
    lines
}

/// Writes the report as text with CSV summary lines.
///
/// Write errors are kept until [`TextReport::finish`].
pub struct TextReport<W, Tz> {
    out: W,
    tz: Tz,
    error: Option<io::Error>,
}

impl<W, Tz> TextReport<W, Tz>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(out: W, tz: Tz) -> Self {
        Self {
            out,
            tz,
            error: None,
        }
    }

    /// Flushes and returns the first write error, if any.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn line(&mut self, text: impl Display) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{}", text) {
            self.error = Some(e);
        }
    }

    fn date(&self, timestamp: Timestamp) -> String {
        match self.tz.timestamp_opt(timestamp.seconds, 0).single() {
            Some(dt) => format!("{} - {}", timestamp.seconds, dt.format("%a %b %e %H:%M:%S %Y")),
            None => timestamp.seconds.to_string(),
        }
    }
}

impl<W, Tz> ReportSink for TextReport<W, Tz>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    fn power(&mut self, kind: PowerKind, watts: i32) {
        self.line(format!("EMS {} power is {} W", kind.label(), watts));
    }

    fn history_value(
        &mut self,
        range: &HistoryRange,
        index: u32,
        timestamp: Timestamp,
        record: &HistoryRecord,
    ) {
        // A single interval only repeats the sum.
        if range.expected_values() <= 1 {
            return;
        }

        let prefix = format!("[{}]-{}", index, value_prefix(range.kind));
        let date = self.date(timestamp);
        self.line(format!("{} Date: {}", prefix, date));
        for (label, value) in field_lines(record, unit(range.kind)) {
            self.line(format!("{} {}: {}", prefix, label, value));
        }
        if index == 1 {
            self.line(format!("{}-CSV-head: {}", prefix, CSV_HEAD));
        }
        self.line(format!("{}-CSV: {}", prefix, csv_line(timestamp.seconds, record)));
    }

    fn history_sum(&mut self, range: &HistoryRange, record: &HistoryRecord) {
        let prefix = sum_prefix(range.kind);
        let start = self.date(range.start);
        let end = self.date(range.end());
        self.line(format!("{} start: {}", prefix, start));
        self.line(format!("{} end: {}", prefix, end));
        for (label, value) in field_lines(record, "Wh") {
            self.line(format!("{} {}: {}", prefix, label, value));
        }
        self.line(format!("{}-CSV-head: {}", prefix, CSV_HEAD));
        self.line(format!("{}-CSV: {}", prefix, csv_line(range.start.seconds, record)));
    }

    fn battery(&mut self, reading: &BatteryReading) {
        if let Some(index) = reading.index {
            self.line(format!("Battery #{}", index));
        }
        if let Some(soc) = reading.rsoc {
            self.line(format!("Battery SOC is {:.1} %", soc));
        }
        if let Some(voltage) = reading.module_voltage {
            self.line(format!("Battery total voltage is {:.1} V", voltage));
        }
        if let Some(current) = reading.current {
            self.line(format!("Battery current is {:.1} A", current));
        }
        if let Some(code) = reading.status_code {
            self.line(format!("Battery status code is 0x{:08X}", code));
        }
        if let Some(code) = reading.error_code {
            self.line(format!("Battery error code is 0x{:08X}", code));
        }
    }

    fn error(&mut self, tag: u32, code: RscpErrorCode) {
        self.line(format!("Tag 0x{:08X} received error code {}", tag, code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn day_range(brief: bool) -> HistoryRange {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        HistoryRange::day(&Utc, date, brief).unwrap()
    }

    fn record() -> HistoryRecord {
        HistoryRecord {
            graph_index: Some(1.0),
            bat_power_in: Some(120.0),
            dc_power: Some(2500.5),
            consumption: Some(800.0),
            bat_charge_level: Some(55.0),
            ..Default::default()
        }
    }

    fn output(report: TextReport<Vec<u8>, Utc>) -> String {
        String::from_utf8(report.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(value_prefix(HistoryKind::Day), "Hour");
        assert_eq!(value_prefix(HistoryKind::Year), "Month");
        assert_eq!(sum_prefix(HistoryKind::Month), "Month");
    }

    #[test]
    fn test_csv_line_fills_missing_fields() {
        assert_eq!(
            csv_line(1717200000, &record()),
            "1717200000;120.00;0.00;55.00;2500.50;0.00;0.00;800.00"
        );
    }

    #[test]
    fn test_day_value() {
        let range = day_range(false);
        let mut report = TextReport::new(Vec::new(), Utc);
        report.history_value(&range, 1, range.start, &record());
        report.history_value(&range, 2, range.record_timestamp(2), &record());

        let text = output(report);
        assert!(text.contains("[1]-Hour Date: 1717200000 - Sat Jun  1 00:00:00 2024"));
        assert!(text.contains("[1]-Hour production: 2500.5 W"));
        assert!(text.contains("[1]-Hour bat charge level: 55.0 %"));
        assert!(text.contains("[1]-Hour-CSV-head: date;batin;batout;batsoc;pro;netin;netout;con"));
        assert!(text.contains("[2]-Hour Date: 1717200900"));
        assert!(!text.contains("[2]-Hour-CSV-head"));
    }

    #[test]
    fn test_brief_skips_values() {
        let range = day_range(true);
        let mut report = TextReport::new(Vec::new(), Utc);
        report.history_value(&range, 1, range.start, &record());
        report.history_sum(&range, &record());

        let text = output(report);
        assert!(!text.contains("Hour"));
        assert!(text.contains("Day start: 1717200000"));
        assert!(text.contains("Day end: 1717286399"));
        assert!(text.contains("Day production: 2500.5 Wh"));
        assert!(text.contains("Day-CSV: 1717200000;120.00;"));
    }

    #[test]
    fn test_power_battery_and_errors() {
        let mut report = TextReport::new(Vec::new(), Utc);
        report.power(PowerKind::Pv, 3200);
        report.battery(&BatteryReading {
            index: Some(0),
            rsoc: Some(76.5),
            status_code: Some(0),
            ..Default::default()
        });
        report.error(0x0300_0001, RscpErrorCode::AccessDenied);

        let text = output(report);
        assert!(text.contains("EMS PV power is 3200 W"));
        assert!(text.contains("Battery SOC is 76.5 %"));
        assert!(text.contains("Battery status code is 0x00000000"));
        assert!(text.contains("Tag 0x03000001 received error code ACCESS_DENIED"));
    }

    #[test]
    fn test_write_error_reported_on_finish() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut report = TextReport::new(Broken, Utc);
        report.power(PowerKind::Grid, 1);
        report.power(PowerKind::Grid, 2);
        let err = report.finish().err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
