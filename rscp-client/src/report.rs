//! Decoded domain data and the report sink receiving it.

use crate::request::HistoryRange;
use rscp_protocol::{tags, RscpErrorCode, Timestamp};
use serde::Serialize;

/// Source of a live power reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerKind {
    Pv,
    Battery,
    Home,
    Grid,
    Additional,
}

impl PowerKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            tags::EMS_POWER_PV => Some(PowerKind::Pv),
            tags::EMS_POWER_BAT => Some(PowerKind::Battery),
            tags::EMS_POWER_HOME => Some(PowerKind::Home),
            tags::EMS_POWER_GRID => Some(PowerKind::Grid),
            tags::EMS_POWER_ADD => Some(PowerKind::Additional),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PowerKind::Pv => "PV",
            PowerKind::Battery => "BAT",
            PowerKind::Home => "house",
            PowerKind::Grid => "grid",
            PowerKind::Additional => "add power meter",
        }
    }
}

/// One history database entry. Fields the device left out stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub graph_index: Option<f32>,
    pub bat_power_in: Option<f32>,
    pub bat_power_out: Option<f32>,
    pub dc_power: Option<f32>,
    pub grid_power_in: Option<f32>,
    pub grid_power_out: Option<f32>,
    pub consumption: Option<f32>,
    pub pm0_power: Option<f32>,
    pub pm1_power: Option<f32>,
    pub bat_charge_level: Option<f32>,
    pub bat_cycle_count: Option<f32>,
    pub consumed_production: Option<f32>,
    pub autarky: Option<f32>,
}

impl HistoryRecord {
    /// Stores a field by its tag. Returns `false` for tags outside the record.
    pub fn set(&mut self, tag: u32, value: f32) -> bool {
        let slot = match tag {
            tags::DB_GRAPH_INDEX => &mut self.graph_index,
            tags::DB_BAT_POWER_IN => &mut self.bat_power_in,
            tags::DB_BAT_POWER_OUT => &mut self.bat_power_out,
            tags::DB_DC_POWER => &mut self.dc_power,
            tags::DB_GRID_POWER_IN => &mut self.grid_power_in,
            tags::DB_GRID_POWER_OUT => &mut self.grid_power_out,
            tags::DB_CONSUMPTION => &mut self.consumption,
            tags::DB_PM_0_POWER => &mut self.pm0_power,
            tags::DB_PM_1_POWER => &mut self.pm1_power,
            tags::DB_BAT_CHARGE_LEVEL => &mut self.bat_charge_level,
            tags::DB_BAT_CYCLE_COUNT => &mut self.bat_cycle_count,
            tags::DB_CONSUMED_PRODUCTION => &mut self.consumed_production,
            tags::DB_AUTARKY => &mut self.autarky,
            _ => return false,
        };
        *slot = Some(value);
        true
    }
}

/// Battery data container contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatteryReading {
    pub index: Option<u8>,
    pub rsoc: Option<f32>,
    pub module_voltage: Option<f32>,
    pub current: Option<f32>,
    pub status_code: Option<u32>,
    pub error_code: Option<u32>,
}

/// Receives decoded data from the router.
///
/// Implementations must not fail; the protocol engine does not wait on them.
pub trait ReportSink {
    fn authenticated(&mut self, _level: u8) {}

    fn power(&mut self, kind: PowerKind, watts: i32);

    /// A value container; `index` is 1-based within the current response.
    fn history_value(
        &mut self,
        range: &HistoryRange,
        index: u32,
        timestamp: Timestamp,
        record: &HistoryRecord,
    );

    fn history_sum(&mut self, range: &HistoryRange, record: &HistoryRecord);

    fn battery(&mut self, reading: &BatteryReading);

    /// The device answered `tag` with an error value.
    fn error(&mut self, tag: u32, code: RscpErrorCode);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerSample {
    pub kind: PowerKind,
    pub watts: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub index: u32,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub record: HistoryRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerError {
    pub tag: u32,
    pub code: RscpErrorCode,
}

/// Sink keeping everything in memory, for `--json` output and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectedReport {
    pub access_level: Option<u8>,
    pub power: Vec<PowerSample>,
    pub history: Option<HistoryRange>,
    pub values: Vec<HistoryEntry>,
    pub sums: Vec<HistoryRecord>,
    pub batteries: Vec<BatteryReading>,
    pub errors: Vec<PeerError>,
}

impl ReportSink for CollectedReport {
    fn authenticated(&mut self, level: u8) {
        self.access_level = Some(level);
    }

    fn power(&mut self, kind: PowerKind, watts: i32) {
        self.power.push(PowerSample { kind, watts });
    }

    fn history_value(
        &mut self,
        range: &HistoryRange,
        index: u32,
        timestamp: Timestamp,
        record: &HistoryRecord,
    ) {
        self.history = Some(*range);
        self.values.push(HistoryEntry {
            index,
            timestamp,
            record: record.clone(),
        });
    }

    fn history_sum(&mut self, range: &HistoryRange, record: &HistoryRecord) {
        self.history = Some(*range);
        self.sums.push(record.clone());
    }

    fn battery(&mut self, reading: &BatteryReading) {
        self.batteries.push(reading.clone());
    }

    fn error(&mut self, tag: u32, code: RscpErrorCode) {
        self.errors.push(PeerError { tag, code });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_kind_from_tag() {
        assert_eq!(PowerKind::from_tag(tags::EMS_POWER_GRID), Some(PowerKind::Grid));
        assert_eq!(PowerKind::from_tag(tags::EMS_REQ_POWER_GRID), None);
        assert_eq!(PowerKind::Home.label(), "house");
    }

    #[test]
    fn test_history_record_set() {
        let mut record = HistoryRecord::default();
        assert!(record.set(tags::DB_DC_POWER, 4200.0));
        assert!(record.set(tags::DB_AUTARKY, 87.5));
        assert!(!record.set(tags::DB_SUM_CONTAINER, 1.0));
        assert_eq!(record.dc_power, Some(4200.0));
        assert_eq!(record.autarky, Some(87.5));
        assert_eq!(record.consumption, None);
    }

    #[test]
    fn test_collected_report_json() {
        let mut report = CollectedReport::default();
        report.power(PowerKind::Pv, 1500);
        report.error(tags::BAT_DATA, RscpErrorCode::AccessDenied);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["power"][0]["kind"], "pv");
        assert_eq!(json["power"][0]["watts"], 1500);
        assert_eq!(json["errors"][0]["code"], "ACCESS_DENIED");
    }
}
