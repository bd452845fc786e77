// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Registered column sets per scheduler log type
//!
//! The decoder exports one CSV table per capture window. Column sets differ
//! between downlink and uplink exports (and between decoder versions), so
//! every column access goes through a [`LogSchema`] lookup instead of
//! assuming a fixed layout. Columns a file carries but the registry does not
//! know are read as text.

use std::fmt;
use std::str::FromStr;

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wall-clock-of-day column present in every export.
pub const TIME_COLUMN: &str = "LocalTime";
/// Radio cell identifier column.
pub const CELL_COLUMN: &str = "CellId";
/// User-equipment scheduling group identifier column.
pub const UE_COLUMN: &str = "UEGID";

/// RLC-reported and scheduled buffer status (downlink)
pub const RLC_REPORTED_BSR: &str = "LCH_SCHD.u32RlcRptBsr";
pub const SCHEDULED_BSR: &str = "LCH_SCHD.u32SchdBsr";
/// Uplink power headroom path loss
pub const PATH_LOSS: &str = "PHR.u16PathLoss";
pub const SINGLE_RB_SINR: &str = "PUSCH_SINR.s16SingleRbSINR";
/// Link adaptation offset, in hundredths of an MCS step
pub const DELTA_MCS: &str = "AMC.s16DeltaMcs";
pub const STD_MCS: &str = "AMC.u8StdMcs";
/// Uplink buffer status report per logical channel group
pub const LCH_GROUP_ID: &str = "BSR.u32LchGrpId";
pub const LCH_GROUP_BSR: &str = "BSR.u32LchGrpBsr";
/// Downlink timing advance command and the UE's reported timing advance
pub const TIMING_ADVANCE_COMMAND: &str = "SCHD.u8Tac";
pub const REPORTED_TA: &str = "TA.as16RptTa";

/// Scheduler log types the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogType {
    DownlinkScheduler,
    UplinkScheduler,
}

impl LogType {
    pub const ALL: [LogType; 2] = [LogType::DownlinkScheduler, LogType::UplinkScheduler];

    /// Subsystem tag embedded in export filenames
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            LogType::DownlinkScheduler => "CMAC_dlUeTtiInfo",
            LogType::UplinkScheduler => "CMAC_ulUeTtiInfo",
        }
    }

    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            LogType::DownlinkScheduler => "dl",
            LogType::UplinkScheduler => "ul",
        }
    }

    #[must_use]
    pub fn schema(self) -> &'static LogSchema {
        LogSchema::of(self)
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::DownlinkScheduler => write!(f, "downlink-scheduler"),
            LogType::UplinkScheduler => write!(f, "uplink-scheduler"),
        }
    }
}

impl FromStr for LogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        LogType::ALL
            .into_iter()
            .find(|t| {
                lowered == t.short_name()
                    || lowered == t.to_string()
                    || lowered == t.tag().to_ascii_lowercase()
            })
            .ok_or_else(|| Error::parse("log type", s))
    }
}

/// Storage class of a registered column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Wall-clock string, converted to a timestamp during load
    Time,
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    /// Arrow type used when decoding the raw export
    #[must_use]
    pub fn raw_type(self) -> DataType {
        match self {
            ColumnKind::Time | ColumnKind::Text => DataType::Utf8,
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
        }
    }
}

/// Columns carrying a specific meaning for the scheduling queries.
///
/// Uplink and downlink name the same concept differently (`ACK.*` vs
/// `CRCI.*`); the facades only ever address columns through these roles.
#[derive(Debug)]
pub struct Roles {
    /// Three-valued acknowledgement code: 0 ack, 1 nack, 2 DTX
    pub ack: &'static str,
    pub dem_time: &'static str,
    pub ack_harq_id: &'static str,
    pub harq_fail: &'static str,
    pub self_maintain: &'static str,
    /// Present on every row carrying a grant; counted for scheduled-UE trends
    pub grant_harq_id: &'static str,
    pub rb_num: &'static str,
    pub tb_size: &'static str,
    pub fail_reason: &'static str,
    pub mcs: Option<&'static str>,
    pub layers: Option<&'static str>,
    pub dci_lost: Option<&'static str>,
}

/// Registered layout of one log type
#[derive(Debug)]
pub struct LogSchema {
    pub log_type: LogType,
    pub columns: &'static [(&'static str, ColumnKind)],
    pub roles: Roles,
}

const DOWNLINK_COLUMNS: &[(&str, ColumnKind)] = &[
    (TIME_COLUMN, ColumnKind::Time),
    ("AirTime", ColumnKind::Integer),
    (CELL_COLUMN, ColumnKind::Integer),
    (UE_COLUMN, ColumnKind::Integer),
    ("ACK.u8AckInfo", ColumnKind::Integer),
    ("ACK.u32DemTime", ColumnKind::Integer),
    ("ACK.u8HarqId", ColumnKind::Integer),
    ("ACK.u8IsSelfMainTain", ColumnKind::Integer),
    ("ACK.u8IsHarqFail", ColumnKind::Integer),
    ("SCHD.u8HarqId", ColumnKind::Integer),
    ("SCHD.u16RbNum", ColumnKind::Integer),
    ("SCHD.u8Layers", ColumnKind::Integer),
    ("SCHD.u32TbSize", ColumnKind::Integer),
    (TIMING_ADVANCE_COMMAND, ColumnKind::Integer),
    ("SCHD_FAIL_RSN.u32UeSchdFailRsn", ColumnKind::Integer),
    (REPORTED_TA, ColumnKind::Integer),
    (RLC_REPORTED_BSR, ColumnKind::Integer),
    (SCHEDULED_BSR, ColumnKind::Integer),
];

const UPLINK_COLUMNS: &[(&str, ColumnKind)] = &[
    (TIME_COLUMN, ColumnKind::Time),
    ("AirTime", ColumnKind::Integer),
    (CELL_COLUMN, ColumnKind::Integer),
    (UE_COLUMN, ColumnKind::Integer),
    ("CRCI.u8AckInfo", ColumnKind::Integer),
    ("CRCI.u32DemTime", ColumnKind::Integer),
    ("CRCI.u8HarqId", ColumnKind::Integer),
    ("CRCI.b8IsHarqFail", ColumnKind::Integer),
    ("CRCI.b8IsSelfMainTain", ColumnKind::Integer),
    ("CRCI.u8DciLostFlag", ColumnKind::Integer),
    ("GRANT.u8HarqId", ColumnKind::Integer),
    ("GRANT.u16RbNum", ColumnKind::Integer),
    ("TB.u8Mcs", ColumnKind::Integer),
    ("TB.u16TbSize", ColumnKind::Integer),
    (PATH_LOSS, ColumnKind::Float),
    (SINGLE_RB_SINR, ColumnKind::Float),
    (DELTA_MCS, ColumnKind::Float),
    (STD_MCS, ColumnKind::Float),
    (LCH_GROUP_ID, ColumnKind::Integer),
    (LCH_GROUP_BSR, ColumnKind::Integer),
    ("SCHD_FAIL_RSN.u32UeSchdFailRsn", ColumnKind::Integer),
];

static DOWNLINK: LogSchema = LogSchema {
    log_type: LogType::DownlinkScheduler,
    columns: DOWNLINK_COLUMNS,
    roles: Roles {
        ack: "ACK.u8AckInfo",
        dem_time: "ACK.u32DemTime",
        ack_harq_id: "ACK.u8HarqId",
        harq_fail: "ACK.u8IsHarqFail",
        self_maintain: "ACK.u8IsSelfMainTain",
        grant_harq_id: "SCHD.u8HarqId",
        rb_num: "SCHD.u16RbNum",
        tb_size: "SCHD.u32TbSize",
        fail_reason: "SCHD_FAIL_RSN.u32UeSchdFailRsn",
        mcs: None,
        layers: Some("SCHD.u8Layers"),
        dci_lost: None,
    },
};

static UPLINK: LogSchema = LogSchema {
    log_type: LogType::UplinkScheduler,
    columns: UPLINK_COLUMNS,
    roles: Roles {
        ack: "CRCI.u8AckInfo",
        dem_time: "CRCI.u32DemTime",
        ack_harq_id: "CRCI.u8HarqId",
        harq_fail: "CRCI.b8IsHarqFail",
        self_maintain: "CRCI.b8IsSelfMainTain",
        grant_harq_id: "GRANT.u8HarqId",
        rb_num: "GRANT.u16RbNum",
        tb_size: "TB.u16TbSize",
        fail_reason: "SCHD_FAIL_RSN.u32UeSchdFailRsn",
        mcs: Some("TB.u8Mcs"),
        layers: None,
        dci_lost: Some("CRCI.u8DciLostFlag"),
    },
};

impl LogSchema {
    #[must_use]
    pub fn of(log_type: LogType) -> &'static LogSchema {
        match log_type {
            LogType::DownlinkScheduler => &DOWNLINK,
            LogType::UplinkScheduler => &UPLINK,
        }
    }

    /// Registered kind of `column`, if any
    #[must_use]
    pub fn kind(&self, column: &str) -> Option<ColumnKind> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, kind)| *kind)
    }

    /// Raw decode type for a column; unregistered columns stay text
    #[must_use]
    pub fn raw_type(&self, column: &str) -> DataType {
        self.kind(column)
            .map_or(DataType::Utf8, ColumnKind::raw_type)
    }

    #[must_use]
    pub fn is_registered(&self, column: &str) -> bool {
        self.kind(column).is_some()
    }
}

/// Scheduling failure reasons, indexed by the code in `SCHD_FAIL_RSN.u32UeSchdFailRsn`
pub const SCHD_FAIL_REASONS: [&str; 30] = [
    "cce_input_param",
    "cce_not_enough",
    "cce_position_collision",
    "cce_pwr_limit",
    "alloc_harqproc_fail",
    "alloc_harqid_fail",
    "alloc_rb_fail",
    "retx_retx_rbnum_different",
    "gap",
    "dmrs_conflict",
    "rbest_fail",
    "has_schded",
    "drx",
    "pttsps_schded",
    "sps_schded",
    "retx_coderate_over",
    "sr_request_time_over",
    "sr_schded",
    "err_state",
    "schd_ue_num_over",
    "pre_cnt_over",
    "ccch_schd_timeover",
    "fbd_schd",
    "msg0_num_over",
    "preamble_id_err",
    "msg0_alloc_cce_fail",
    "cce_alloc_fail",
    "retx_occupy_rb_fail",
    "pttgap",
    "other",
];

/// Human readable name of a failure reason code
#[must_use]
pub fn fail_reason_name(code: i64) -> String {
    usize::try_from(code)
        .ok()
        .and_then(|idx| SCHD_FAIL_REASONS.get(idx))
        .map_or_else(|| format!("unknown({code})"), |name| (*name).to_string())
}
