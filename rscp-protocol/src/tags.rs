//! Tag catalogue.
//!
//! A tag is a 32 bit identifier: the high byte selects the namespace
//! (RSCP, EMS, BAT, DB, ...) and bit 23 marks a response.

/// Bit set in every tag sent by the device as a response.
pub const RESPONSE_FLAG: u32 = 0x0080_0000;

// RSCP namespace
pub const RSCP_REQ_AUTHENTICATION: u32 = 0x0000_0001;
pub const RSCP_AUTHENTICATION_USER: u32 = 0x0000_0002;
pub const RSCP_AUTHENTICATION_PASSWORD: u32 = 0x0000_0003;
pub const RSCP_AUTHENTICATION: u32 = 0x0080_0001;

// EMS namespace
pub const EMS_REQ_POWER_PV: u32 = 0x0100_0001;
pub const EMS_REQ_POWER_BAT: u32 = 0x0100_0002;
pub const EMS_REQ_POWER_HOME: u32 = 0x0100_0003;
pub const EMS_REQ_POWER_GRID: u32 = 0x0100_0004;
pub const EMS_REQ_POWER_ADD: u32 = 0x0100_0005;
pub const EMS_POWER_PV: u32 = 0x0180_0001;
pub const EMS_POWER_BAT: u32 = 0x0180_0002;
pub const EMS_POWER_HOME: u32 = 0x0180_0003;
pub const EMS_POWER_GRID: u32 = 0x0180_0004;
pub const EMS_POWER_ADD: u32 = 0x0180_0005;

// BAT namespace
pub const BAT_REQ_DATA: u32 = 0x0304_0000;
pub const BAT_DATA: u32 = 0x0384_0000;
pub const BAT_INDEX: u32 = 0x0304_0001;
pub const BAT_REQ_RSOC: u32 = 0x0300_0002;
pub const BAT_REQ_MODULE_VOLTAGE: u32 = 0x0300_0003;
pub const BAT_REQ_CURRENT: u32 = 0x0300_0004;
pub const BAT_REQ_STATUS_CODE: u32 = 0x0300_0102;
pub const BAT_REQ_ERROR_CODE: u32 = 0x0300_0103;
pub const BAT_RSOC: u32 = 0x0380_0002;
pub const BAT_MODULE_VOLTAGE: u32 = 0x0380_0003;
pub const BAT_CURRENT: u32 = 0x0380_0004;
pub const BAT_STATUS_CODE: u32 = 0x0380_0102;
pub const BAT_ERROR_CODE: u32 = 0x0380_0103;

// DB namespace
pub const DB_REQ_HISTORY_DATA_DAY: u32 = 0x0600_0100;
pub const DB_REQ_HISTORY_TIME_START: u32 = 0x0600_0101;
pub const DB_REQ_HISTORY_TIME_INTERVAL: u32 = 0x0600_0102;
pub const DB_REQ_HISTORY_TIME_SPAN: u32 = 0x0600_0103;
pub const DB_REQ_HISTORY_DATA_WEEK: u32 = 0x0600_0200;
pub const DB_REQ_HISTORY_DATA_MONTH: u32 = 0x0600_0300;
pub const DB_REQ_HISTORY_DATA_YEAR: u32 = 0x0600_0400;
pub const DB_HISTORY_DATA_DAY: u32 = 0x0680_0100;
pub const DB_HISTORY_DATA_WEEK: u32 = 0x0680_0200;
pub const DB_HISTORY_DATA_MONTH: u32 = 0x0680_0300;
pub const DB_HISTORY_DATA_YEAR: u32 = 0x0680_0400;
pub const DB_SUM_CONTAINER: u32 = 0x0680_0010;
pub const DB_VALUE_CONTAINER: u32 = 0x0680_0020;
pub const DB_GRAPH_INDEX: u32 = 0x0680_0001;
pub const DB_BAT_POWER_IN: u32 = 0x0680_0002;
pub const DB_BAT_POWER_OUT: u32 = 0x0680_0003;
pub const DB_DC_POWER: u32 = 0x0680_0004;
pub const DB_GRID_POWER_IN: u32 = 0x0680_0005;
pub const DB_GRID_POWER_OUT: u32 = 0x0680_0006;
pub const DB_CONSUMPTION: u32 = 0x0680_0007;
pub const DB_PM_0_POWER: u32 = 0x0680_0008;
pub const DB_PM_1_POWER: u32 = 0x0680_0009;
pub const DB_BAT_CHARGE_LEVEL: u32 = 0x0680_000A;
pub const DB_BAT_CYCLE_COUNT: u32 = 0x0680_000B;
pub const DB_CONSUMED_PRODUCTION: u32 = 0x0680_000C;
pub const DB_AUTARKY: u32 = 0x0680_000D;

/// Returns whether `tag` is a device response tag.
pub fn is_response(tag: u32) -> bool {
    tag & RESPONSE_FLAG != 0
}

/// Returns the response tag matching a request tag.
pub fn response_for(request: u32) -> u32 {
    request | RESPONSE_FLAG
}

/// Human-readable tag name for log output.
pub fn tag_name(tag: u32) -> Option<&'static str> {
    let name = match tag {
        RSCP_REQ_AUTHENTICATION => "RSCP_REQ_AUTHENTICATION",
        RSCP_AUTHENTICATION_USER => "RSCP_AUTHENTICATION_USER",
        RSCP_AUTHENTICATION_PASSWORD => "RSCP_AUTHENTICATION_PASSWORD",
        RSCP_AUTHENTICATION => "RSCP_AUTHENTICATION",
        EMS_REQ_POWER_PV => "EMS_REQ_POWER_PV",
        EMS_REQ_POWER_BAT => "EMS_REQ_POWER_BAT",
        EMS_REQ_POWER_HOME => "EMS_REQ_POWER_HOME",
        EMS_REQ_POWER_GRID => "EMS_REQ_POWER_GRID",
        EMS_REQ_POWER_ADD => "EMS_REQ_POWER_ADD",
        EMS_POWER_PV => "EMS_POWER_PV",
        EMS_POWER_BAT => "EMS_POWER_BAT",
        EMS_POWER_HOME => "EMS_POWER_HOME",
        EMS_POWER_GRID => "EMS_POWER_GRID",
        EMS_POWER_ADD => "EMS_POWER_ADD",
        BAT_REQ_DATA => "BAT_REQ_DATA",
        BAT_DATA => "BAT_DATA",
        BAT_INDEX => "BAT_INDEX",
        BAT_RSOC => "BAT_RSOC",
        BAT_MODULE_VOLTAGE => "BAT_MODULE_VOLTAGE",
        BAT_CURRENT => "BAT_CURRENT",
        BAT_STATUS_CODE => "BAT_STATUS_CODE",
        BAT_ERROR_CODE => "BAT_ERROR_CODE",
        DB_REQ_HISTORY_DATA_DAY => "DB_REQ_HISTORY_DATA_DAY",
        DB_REQ_HISTORY_DATA_WEEK => "DB_REQ_HISTORY_DATA_WEEK",
        DB_REQ_HISTORY_DATA_MONTH => "DB_REQ_HISTORY_DATA_MONTH",
        DB_REQ_HISTORY_DATA_YEAR => "DB_REQ_HISTORY_DATA_YEAR",
        DB_HISTORY_DATA_DAY => "DB_HISTORY_DATA_DAY",
        DB_HISTORY_DATA_WEEK => "DB_HISTORY_DATA_WEEK",
        DB_HISTORY_DATA_MONTH => "DB_HISTORY_DATA_MONTH",
        DB_HISTORY_DATA_YEAR => "DB_HISTORY_DATA_YEAR",
        DB_SUM_CONTAINER => "DB_SUM_CONTAINER",
        DB_VALUE_CONTAINER => "DB_VALUE_CONTAINER",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_flag() {
        assert!(!is_response(RSCP_REQ_AUTHENTICATION));
        assert!(is_response(RSCP_AUTHENTICATION));
        assert_eq!(response_for(EMS_REQ_POWER_PV), EMS_POWER_PV);
        assert_eq!(response_for(BAT_REQ_DATA), BAT_DATA);
        assert_eq!(response_for(DB_REQ_HISTORY_DATA_MONTH), DB_HISTORY_DATA_MONTH);
    }

    #[test]
    fn test_tag_name() {
        assert_eq!(tag_name(EMS_POWER_GRID), Some("EMS_POWER_GRID"));
        assert_eq!(tag_name(0x0F00_0000), None);
    }
}
