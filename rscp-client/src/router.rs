//! Response routing.
//!
//! Walks the top-level values of each response frame and hands decoded data
//! to a [`ReportSink`]. An error value inside a container ends the walk over
//! its siblings: the rest of that container is skipped, its parent carries on.
//! The frame body is not a container, so a top-level error only drops itself.

use crate::error::ClientError;
use crate::report::{BatteryReading, HistoryRecord, PowerKind, ReportSink};
use crate::request::{HistoryKind, HistoryRange};
use rscp_protocol::{tags, Frame, Timestamp, Tlv};

/// Per-session routing state.
#[derive(Debug, Default)]
pub struct Router {
    history: Option<HistoryRange>,
    graph_index: u32,
    access_level: Option<u8>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the range of the outstanding history request, used to time stamp records.
    pub fn set_history(&mut self, range: Option<HistoryRange>) {
        self.history = range;
    }

    /// Access level from the last authentication response.
    pub fn access_level(&self) -> Option<u8> {
        self.access_level
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_level.is_some_and(|level| level > 0)
    }

    pub fn route_frame<S>(&mut self, frame: Frame, sink: &mut S) -> Result<(), ClientError>
    where
        S: ReportSink + ?Sized,
    {
        self.route_values(&frame.values, sink)
    }

    /// Routes the top-level values of a frame; typed decode failures are fatal.
    pub fn route_values<S>(&mut self, values: &[Tlv], sink: &mut S) -> Result<(), ClientError>
    where
        S: ReportSink + ?Sized,
    {
        for value in values {
            if report_error(value, sink) {
                continue;
            }

            let tag = value.tag();
            if let Some(kind) = PowerKind::from_tag(tag) {
                let watts = value.as_i32()?;
                tracing::debug!("EMS {} power is {} W", kind.label(), watts);
                sink.power(kind, watts);
                continue;
            }

            match tag {
                tags::RSCP_AUTHENTICATION => {
                    let level = value.as_u8()?;
                    tracing::info!("RSCP authentication level {}", level);
                    self.access_level = Some(level);
                    sink.authenticated(level);
                }
                tags::DB_HISTORY_DATA_DAY | tags::DB_HISTORY_DATA_MONTH | tags::DB_HISTORY_DATA_YEAR => {
                    self.route_history(value, sink)?;
                }
                tags::BAT_DATA => self.route_battery(value, sink)?,
                _ => tracing::warn!("Unknown tag {}", tag_label(tag)),
            }
        }
        Ok(())
    }

    fn history_range(&self, tag: u32) -> HistoryRange {
        let kind = HistoryKind::from_response_tag(tag).unwrap_or(HistoryKind::Day);
        match self.history {
            Some(range) if range.kind == kind => range,
            _ => {
                tracing::warn!("History response {} without matching request", tag_label(tag));
                HistoryRange {
                    kind,
                    start: Timestamp::default(),
                    interval: 0,
                    span: 0,
                }
            }
        }
    }

    fn route_history<S>(&mut self, value: &Tlv, sink: &mut S) -> Result<(), ClientError>
    where
        S: ReportSink + ?Sized,
    {
        let range = self.history_range(value.tag());
        self.graph_index = 0;

        for child in value.as_container()? {
            if report_error(child, sink) {
                break;
            }

            match child.tag() {
                tags::DB_SUM_CONTAINER => {
                    self.graph_index = 0;
                    let record = decode_record(child, sink)?;
                    sink.history_sum(&range, &record);
                }
                tags::DB_VALUE_CONTAINER => {
                    self.graph_index += 1;
                    let record = decode_record(child, sink)?;
                    let timestamp = range.record_timestamp(self.graph_index);
                    sink.history_value(&range, self.graph_index, timestamp, &record);
                }
                other => tracing::warn!("Unknown db tag {}", tag_label(other)),
            }
        }
        Ok(())
    }

    fn route_battery<S>(&mut self, value: &Tlv, sink: &mut S) -> Result<(), ClientError>
    where
        S: ReportSink + ?Sized,
    {
        let mut reading = BatteryReading::default();

        for child in value.as_container()? {
            if report_error(child, sink) {
                break;
            }

            match child.tag() {
                tags::BAT_INDEX => reading.index = Some(child.as_u8()?),
                tags::BAT_RSOC => reading.rsoc = Some(child.as_f32()?),
                tags::BAT_MODULE_VOLTAGE => reading.module_voltage = Some(child.as_f32()?),
                tags::BAT_CURRENT => reading.current = Some(child.as_f32()?),
                tags::BAT_STATUS_CODE => reading.status_code = Some(child.as_u32()?),
                tags::BAT_ERROR_CODE => reading.error_code = Some(child.as_u32()?),
                other => tracing::warn!("Unknown battery tag {}", tag_label(other)),
            }
        }

        sink.battery(&reading);
        Ok(())
    }
}

/// Tag for log lines: the symbolic name if known, always the hex value.
fn tag_label(tag: u32) -> String {
    match tags::tag_name(tag) {
        Some(name) => format!("{} ({:#010x})", name, tag),
        None => format!("{:#010x}", tag),
    }
}

/// Reports an error value. Returns `true` if `value` was one.
fn report_error<S>(value: &Tlv, sink: &mut S) -> bool
where
    S: ReportSink + ?Sized,
{
    match value.as_error() {
        Ok(code) => {
            tracing::error!("Tag {} received error code {}", tag_label(value.tag()), code);
            sink.error(value.tag(), code);
            true
        }
        Err(_) => false,
    }
}

fn decode_record<S>(container: &Tlv, sink: &mut S) -> Result<HistoryRecord, ClientError>
where
    S: ReportSink + ?Sized,
{
    let mut record = HistoryRecord::default();
    for field in container.as_container()? {
        if report_error(field, sink) {
            break;
        }
        if !record.set(field.tag(), field.as_f32()?) {
            tracing::warn!("Unknown history field {}", tag_label(field.tag()));
        }
    }
    Ok(record)
}
