//! Request builders.

use crate::error::ClientError;
use chrono::{NaiveDate, TimeZone};
use rscp_protocol::tags;
use rscp_protocol::value::ContainerBuilder;
use rscp_protocol::{Timestamp, Tlv};
use serde::Serialize;

/// Power telemetry requested with every data request by default.
pub const DEFAULT_POWER_TAGS: [u32; 5] = [
    tags::EMS_REQ_POWER_PV,
    tags::EMS_REQ_POWER_BAT,
    tags::EMS_REQ_POWER_HOME,
    tags::EMS_REQ_POWER_GRID,
    tags::EMS_REQ_POWER_ADD,
];

const SECS_PER_DAY: i64 = 24 * 3600;
const QUARTER_HOUR: i64 = 15 * 60;

/// Builds the authentication request tree.
pub fn authentication_request(user: &str, password: &str) -> Tlv {
    ContainerBuilder::root()
        .push(
            ContainerBuilder::new(tags::RSCP_REQ_AUTHENTICATION)
                .value(tags::RSCP_AUTHENTICATION_USER, user)
                .value(tags::RSCP_AUTHENTICATION_PASSWORD, password)
                .build(),
        )
        .build()
}

/// Granularity of a history database query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Day,
    Month,
    Year,
}

impl HistoryKind {
    pub fn request_tag(&self) -> u32 {
        match self {
            HistoryKind::Day => tags::DB_REQ_HISTORY_DATA_DAY,
            HistoryKind::Month => tags::DB_REQ_HISTORY_DATA_MONTH,
            HistoryKind::Year => tags::DB_REQ_HISTORY_DATA_YEAR,
        }
    }

    pub fn response_tag(&self) -> u32 {
        tags::response_for(self.request_tag())
    }

    pub fn from_response_tag(tag: u32) -> Option<Self> {
        match tag {
            tags::DB_HISTORY_DATA_DAY => Some(HistoryKind::Day),
            tags::DB_HISTORY_DATA_MONTH => Some(HistoryKind::Month),
            tags::DB_HISTORY_DATA_YEAR => Some(HistoryKind::Year),
            _ => None,
        }
    }
}

/// Time window of a history query. `interval` and `span` are durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryRange {
    pub kind: HistoryKind,
    pub start: Timestamp,
    pub interval: i64,
    pub span: i64,
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<i64, ClientError> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ClientError::InvalidRange(format!("no midnight on {}", date)))?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| {
            ClientError::InvalidRange(format!("{} does not exist in this time zone", midnight))
        })
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, ClientError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ClientError::InvalidRange(format!("invalid month {}-{}", year, month)))
}

impl HistoryRange {
    /// One calendar day starting at local midnight: 96 quarter-hour values,
    /// or a single 24 hour value in brief mode.
    pub fn day<Tz: TimeZone>(tz: &Tz, date: NaiveDate, brief: bool) -> Result<Self, ClientError> {
        let start = local_midnight(tz, date)?;
        Ok(Self {
            kind: HistoryKind::Day,
            start: Timestamp::from_secs(start),
            interval: if brief { SECS_PER_DAY } else { QUARTER_HOUR },
            span: SECS_PER_DAY - 1,
        })
    }

    /// One calendar month: daily values, or the whole month as one value in brief mode.
    pub fn month<Tz: TimeZone>(
        tz: &Tz,
        year: i32,
        month: u32,
        brief: bool,
    ) -> Result<Self, ClientError> {
        let first = first_of_month(year, month)?;
        let next = if month == 12 {
            first_of_month(year + 1, 1)?
        } else {
            first_of_month(year, month + 1)?
        };

        let start = local_midnight(tz, first)?;
        let span = local_midnight(tz, next)? - start - 1;
        Ok(Self {
            kind: HistoryKind::Month,
            start: Timestamp::from_secs(start),
            interval: if brief { span } else { SECS_PER_DAY },
            span,
        })
    }

    /// One calendar year as a single interval; only the sum is meaningful.
    pub fn year<Tz: TimeZone>(tz: &Tz, year: i32) -> Result<Self, ClientError> {
        let start = local_midnight(tz, first_of_month(year, 1)?)?;
        let span = local_midnight(tz, first_of_month(year + 1, 1)?)? - start - 1;
        Ok(Self {
            kind: HistoryKind::Year,
            start: Timestamp::from_secs(start),
            interval: span,
            span,
        })
    }

    pub fn end(&self) -> Timestamp {
        self.start.offset_secs(self.span)
    }

    /// Start time of the value container with the given 1-based index.
    pub fn record_timestamp(&self, index: u32) -> Timestamp {
        let offset = i64::from(index.saturating_sub(1)) * self.interval;
        self.start.offset_secs(offset)
    }

    /// Number of value containers the device answers with.
    pub fn expected_values(&self) -> i64 {
        if self.interval <= 0 {
            return 0;
        }
        (self.span + 1) / self.interval
    }

    pub fn to_tlv(&self) -> Tlv {
        ContainerBuilder::new(self.kind.request_tag())
            .value(tags::DB_REQ_HISTORY_TIME_START, self.start)
            .value(
                tags::DB_REQ_HISTORY_TIME_INTERVAL,
                Timestamp::from_secs(self.interval),
            )
            .value(tags::DB_REQ_HISTORY_TIME_SPAN, Timestamp::from_secs(self.span))
            .build()
    }
}

/// Payload of an authenticated cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub power: Vec<u32>,
    pub battery: Option<u8>,
    pub history: Option<HistoryRange>,
}

impl Default for DataRequest {
    fn default() -> Self {
        Self {
            power: DEFAULT_POWER_TAGS.to_vec(),
            battery: None,
            history: None,
        }
    }
}

impl DataRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_power_tags(mut self, power: Vec<u32>) -> Self {
        self.power = power;
        self
    }

    pub fn with_battery(mut self, index: u8) -> Self {
        self.battery = Some(index);
        self
    }

    pub fn with_history(mut self, range: HistoryRange) -> Self {
        self.history = Some(range);
        self
    }

    pub fn to_tlv(&self) -> Tlv {
        let mut root = ContainerBuilder::root();
        for &tag in &self.power {
            root = root.request(tag);
        }

        if let Some(index) = self.battery {
            root = root.push(
                ContainerBuilder::new(tags::BAT_REQ_DATA)
                    .value(tags::BAT_INDEX, index)
                    .request(tags::BAT_REQ_RSOC)
                    .request(tags::BAT_REQ_MODULE_VOLTAGE)
                    .request(tags::BAT_REQ_CURRENT)
                    .request(tags::BAT_REQ_STATUS_CODE)
                    .request(tags::BAT_REQ_ERROR_CODE)
                    .build(),
            );
        }

        if let Some(range) = &self.history {
            root = root.push(range.to_tlv());
        }

        root.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use rscp_protocol::DataType;

    fn utc_midnight(year: i32, month: u32, day: u32) -> i64 {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .unwrap()
            .timestamp()
    }

    #[test]
    fn test_authentication_request() {
        let root = authentication_request("alice", "secret");
        assert!(root.is_root());
        let children = root.as_container().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].tag(), tags::RSCP_REQ_AUTHENTICATION);

        let fields = children[0].as_container().unwrap();
        assert_eq!(fields[0].as_str().unwrap(), "alice");
        assert_eq!(fields[1].as_str().unwrap(), "secret");
    }

    #[test]
    fn test_day_range() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let range = HistoryRange::day(&Utc, date, false).unwrap();
        assert_eq!(range.start.seconds, utc_midnight(2024, 3, 10));
        assert_eq!(range.interval, 900);
        assert_eq!(range.span, 86_399);
        assert_eq!(range.expected_values(), 96);
        assert_eq!(range.end().seconds, utc_midnight(2024, 3, 11) - 1);

        let brief = HistoryRange::day(&Utc, date, true).unwrap();
        assert_eq!(brief.interval, 86_400);
        assert_eq!(brief.expected_values(), 1);
    }

    #[test]
    fn test_day_range_local_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let cet = FixedOffset::east_opt(3600).unwrap();
        let range = HistoryRange::day(&cet, date, false).unwrap();
        assert_eq!(range.start.seconds, utc_midnight(2024, 3, 10) - 3600);
    }

    #[test]
    fn test_month_range() {
        let range = HistoryRange::month(&Utc, 2024, 2, false).unwrap();
        assert_eq!(range.start.seconds, utc_midnight(2024, 2, 1));
        assert_eq!(range.span, 29 * 86_400 - 1);
        assert_eq!(range.interval, 86_400);
        assert_eq!(range.expected_values(), 29);

        let brief = HistoryRange::month(&Utc, 2024, 2, true).unwrap();
        assert_eq!(brief.interval, brief.span);
    }

    #[test]
    fn test_month_range_december() {
        let range = HistoryRange::month(&Utc, 2023, 12, false).unwrap();
        assert_eq!(range.span, 31 * 86_400 - 1);
        assert_eq!(range.end().seconds, utc_midnight(2024, 1, 1) - 1);
    }

    #[test]
    fn test_invalid_month() {
        assert!(matches!(
            HistoryRange::month(&Utc, 2024, 13, false),
            Err(ClientError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_year_range() {
        let range = HistoryRange::year(&Utc, 2024).unwrap();
        assert_eq!(range.start.seconds, utc_midnight(2024, 1, 1));
        assert_eq!(range.span, 366 * 86_400 - 1);
        assert_eq!(range.interval, range.span);
        assert_eq!(range.kind.response_tag(), tags::DB_HISTORY_DATA_YEAR);
    }

    #[test]
    fn test_record_timestamp() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let range = HistoryRange::day(&Utc, date, false).unwrap();
        assert_eq!(range.record_timestamp(1), range.start);
        assert_eq!(range.record_timestamp(96).seconds, range.start.seconds + 95 * 900);
        // Index 0 only occurs before the first value container
        assert_eq!(range.record_timestamp(0), range.start);
    }

    #[test]
    fn test_history_tlv() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let range = HistoryRange::day(&Utc, date, false).unwrap();
        let tlv = range.to_tlv();
        assert_eq!(tlv.tag(), tags::DB_REQ_HISTORY_DATA_DAY);

        let fields = tlv.as_container().unwrap();
        assert_eq!(fields.len(), 3);
        assert!(fields.iter().all(|f| f.data_type() == DataType::Timestamp));
        assert_eq!(fields[0].as_timestamp().unwrap(), range.start);
        assert_eq!(fields[1].as_timestamp().unwrap().seconds, 900);
        assert_eq!(fields[2].as_timestamp().unwrap().seconds, 86_399);
    }

    #[test]
    fn test_data_request() {
        let root = DataRequest::new().to_tlv();
        let requested: Vec<u32> = root.as_container().unwrap().iter().map(Tlv::tag).collect();
        assert_eq!(requested, DEFAULT_POWER_TAGS.to_vec());

        let range = HistoryRange::year(&Utc, 2023).unwrap();
        let root = DataRequest::new()
            .with_power_tags(vec![tags::EMS_REQ_POWER_PV])
            .with_battery(0)
            .with_history(range)
            .to_tlv();
        let children = root.as_container().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[1].tag(), tags::BAT_REQ_DATA);
        assert_eq!(children[1].as_container().unwrap()[0].as_u8().unwrap(), 0);
        assert_eq!(children[2].tag(), tags::DB_REQ_HISTORY_DATA_YEAR);
    }

    #[test]
    fn test_history_kind_tags() {
        for kind in [HistoryKind::Day, HistoryKind::Month, HistoryKind::Year] {
            assert_eq!(HistoryKind::from_response_tag(kind.response_tag()), Some(kind));
        }
        assert_eq!(HistoryKind::from_response_tag(tags::DB_HISTORY_DATA_WEEK), None);
    }
}
