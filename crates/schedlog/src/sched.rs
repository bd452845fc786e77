// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Scheduling queries over a cell- or UE-bound view
//!
//! Downlink and uplink exports name the same concepts differently; every
//! query here goes through the log type's [`crate::schema::Roles`], so one
//! [`SchedView`] serves both directions. Queries that only make sense for one
//! direction fail with `UnknownColumn` on the other.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;

use crate::aggregate::{BucketPlan, BucketedAggregate, Reduction, aggregate, histogram, Histogram, Value};
use crate::error::{Error, Result};
use crate::filter::{ValueFilter, as_int64};
use crate::metrics::{self, DTX_CODE};
use crate::schema::{
    DELTA_MCS, LCH_GROUP_BSR, LCH_GROUP_ID, LogSchema, LogType, PATH_LOSS, REPORTED_TA,
    RLC_REPORTED_BSR, SCHEDULED_BSR, SINGLE_RB_SINR, STD_MCS, TIME_COLUMN, TIMING_ADVANCE_COMMAND,
    UE_COLUMN, fail_reason_name,
};
use crate::time::TimeInterval;
use crate::view::LogView;

/// Transmission layer counts reported by the downlink scheduler
const LAYER_COUNTS: [i64; 4] = [1, 2, 3, 4];

/// TAC value meaning "no adjustment"
const TAC_NEUTRAL: i64 = 31;
/// Time units per TAC step
const TAC_STEP_TS: i64 = 16;

/// Name of the TAC adjustment column in [`SchedView::ta_trend`] output
pub const TAC_ADJUST_COLUMN: &str = "tac_ts";

/// Which end of the reported buffer status to trend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsrBound {
    Min,
    Max,
}

/// Row-level events worth listing one by one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    HarqFail,
    SelfMaintain,
    Dtx,
    Dci0Lost,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::HarqFail,
        EventKind::SelfMaintain,
        EventKind::Dtx,
        EventKind::Dci0Lost,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::HarqFail => "harq-fail",
            EventKind::SelfMaintain => "self-maintain",
            EventKind::Dtx => "dtx",
            EventKind::Dci0Lost => "dci0-lost",
        };
        write!(f, "{name}")
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase().replace('_', "-");
        EventKind::ALL
            .into_iter()
            .find(|k| k.to_string() == lowered)
            .ok_or_else(|| Error::parse("event kind", s))
    }
}

/// Scheduling queries bound to one view
#[derive(Debug, Clone)]
pub struct SchedView {
    view: Arc<LogView>,
}

impl SchedView {
    #[must_use]
    pub fn new(view: Arc<LogView>) -> Self {
        Self { view }
    }

    #[must_use]
    pub fn view(&self) -> &Arc<LogView> {
        &self.view
    }

    #[must_use]
    pub fn log_type(&self) -> LogType {
        self.view.log_type()
    }

    #[must_use]
    pub fn schema(&self) -> &'static LogSchema {
        self.view.schema()
    }

    /// `column` if this direction registers it
    fn require(&self, column: Option<&'static str>, what: &str) -> Result<&'static str> {
        column
            .filter(|c| self.schema().is_registered(c))
            .ok_or_else(|| Error::UnknownColumn {
                column: format!("{what} ({})", self.log_type()),
            })
    }

    pub async fn bler(&self, bucket_secs: f64, slot: Option<u32>) -> Result<BucketedAggregate> {
        metrics::bler(&self.view, bucket_secs, slot).await
    }

    /// Buckets whose BLER exceeds `threshold`; buckets without any
    /// acknowledgement are skipped
    pub async fn find_bler_over(
        &self,
        threshold: f64,
        bucket_secs: f64,
    ) -> Result<Vec<(NaiveDateTime, f64)>> {
        let bler = self.bler(bucket_secs, None).await?;
        Ok(bler
            .points("bler")
            .into_iter()
            .filter_map(|(start, value)| value.filter(|v| *v > threshold).map(|v| (start, v)))
            .collect())
    }

    /// Scheduled UEs per bucket: rows carrying a grant HARQ id
    pub async fn schd_ue_count(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let roles = &self.schema().roles;
        aggregate(&self.view, &[roles.grant_harq_id], bucket_secs, Reduction::Count, None).await
    }

    pub async fn rb_num_trend(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let roles = &self.schema().roles;
        aggregate(&self.view, &[roles.rb_num], bucket_secs, Reduction::Mean, None).await
    }

    pub async fn rb_num_histogram(&self) -> Result<Histogram> {
        histogram(&self.view, self.schema().roles.rb_num, None).await
    }

    pub async fn mcs_trend(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let mcs = self.require(self.schema().roles.mcs, "mcs")?;
        aggregate(&self.view, &[mcs], bucket_secs, Reduction::Mean, None).await
    }

    /// Transport block kilobits per bucket
    pub async fn throughput_kbits(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let tb_size = self.schema().roles.tb_size;
        let bytes = aggregate(&self.view, &[tb_size], bucket_secs, Reduction::Sum, None).await?;
        Ok(bytes.scaled(tb_size, 8.0 / 1000.0, "throughput_kbits"))
    }

    pub async fn dtx_count(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let ack = self.schema().roles.ack;
        metrics::code_count(&self.view, "dtx", ack, &[DTX_CODE], bucket_secs).await
    }

    pub async fn harq_fail_count(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let harq_fail = self.schema().roles.harq_fail;
        metrics::code_count(&self.view, "harq_fail", harq_fail, &[1], bucket_secs).await
    }

    /// Scheduling failure reasons by name, most frequent first
    pub async fn fail_reasons(&self) -> Result<Vec<(String, u64)>> {
        let hist = histogram(&self.view, self.schema().roles.fail_reason, None).await?;
        let mut reasons: Vec<(String, u64)> = hist
            .counts
            .iter()
            .map(|(value, count)| {
                let name = value
                    .as_i64()
                    .map_or_else(|| value.to_string(), fail_reason_name);
                (name, *count)
            })
            .collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(reasons)
    }

    /// Share of each downlink layer count per bucket
    pub async fn layer_ratio(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let layers = self.require(self.schema().roles.layers, "layers")?;
        let valid = ValueFilter::new().allow(layers, LAYER_COUNTS);
        aggregate(
            &self.view,
            &[layers],
            bucket_secs,
            Reduction::ValueHistogram { ratio: true },
            Some(&valid),
        )
        .await
    }

    pub async fn dci0_lost_ratio(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        self.require(self.schema().roles.dci_lost, "dci0 lost")?;
        metrics::dci0_lost_ratio(&self.view, bucket_secs).await
    }

    pub async fn dci0_lost_count(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        self.require(self.schema().roles.dci_lost, "dci0 lost")?;
        let ack = self.schema().roles.ack;
        metrics::code_count(&self.view, "dci0_lost", ack, &[DTX_CODE], bucket_secs).await
    }

    pub async fn pathloss_trend(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let column = self.require(Some(PATH_LOSS), "path loss")?;
        aggregate(&self.view, &[column], bucket_secs, Reduction::Mean, None).await
    }

    pub async fn single_rb_sinr_trend(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let column = self.require(Some(SINGLE_RB_SINR), "single RB SINR")?;
        aggregate(&self.view, &[column], bucket_secs, Reduction::Mean, None).await
    }

    /// Mean single RB SINR, delta MCS (in MCS steps) and standard MCS
    pub async fn amc_trend(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let columns = [
            self.require(Some(SINGLE_RB_SINR), "single RB SINR")?,
            self.require(Some(DELTA_MCS), "delta MCS")?,
            self.require(Some(STD_MCS), "standard MCS")?,
        ];
        let means = aggregate(&self.view, &columns, bucket_secs, Reduction::Mean, None).await?;
        Ok(means.scaled(DELTA_MCS, 0.01, DELTA_MCS))
    }

    /// Row by row timing advance: TAC adjustment in time units next to the
    /// timing advance the UE reported
    pub async fn ta_trend(&self) -> Result<RecordBatch> {
        let tac = self.require(Some(TIMING_ADVANCE_COMMAND), "timing advance command")?;
        let reported = self.require(Some(REPORTED_TA), "reported TA")?;
        let rows = self.view.load(&[TIME_COLUMN, tac, reported], None).await?.concat()?;
        let adjust: Int64Array = as_int64(rows.column(1), tac)?
            .iter()
            .map(|v| v.map(|v| (v - TAC_NEUTRAL) * TAC_STEP_TS))
            .collect();
        let rows_schema = rows.schema();
        let schema = Schema::new(vec![
            rows_schema.field(0).clone(),
            Field::new(TAC_ADJUST_COLUMN, DataType::Int64, true),
            rows_schema.field(2).clone(),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::clone(rows.column(0)),
            Arc::new(adjust),
            Arc::clone(rows.column(2)),
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    /// Smallest or largest reported buffer status of one logical channel
    /// group per bucket
    pub async fn reported_bsr(
        &self,
        lch_group: i64,
        bound: BsrBound,
        bucket_secs: f64,
    ) -> Result<BucketedAggregate> {
        let column = self.require(Some(LCH_GROUP_BSR), "reported BSR")?;
        let group = ValueFilter::new().allow(LCH_GROUP_ID, [lch_group]);
        let reduction = match bound {
            BsrBound::Min => Reduction::Min,
            BsrBound::Max => Reduction::Max,
        };
        aggregate(&self.view, &[column], bucket_secs, reduction, Some(&group)).await
    }

    /// Whether the scheduled buffer status never exceeds what RLC reported
    pub async fn bsr_enough(&self) -> Result<bool> {
        let reported = self.require(Some(RLC_REPORTED_BSR), "RLC reported BSR")?;
        let scheduled = self.require(Some(SCHEDULED_BSR), "scheduled BSR")?;
        let outcome = self.view.load(&[reported, scheduled], None).await?;
        for batch in outcome.record_batches() {
            let reported = as_int64(batch.column(0), reported)?;
            let scheduled = as_int64(batch.column(1), scheduled)?;
            let over = (0..batch.num_rows()).any(|row| {
                reported.is_valid(row)
                    && scheduled.is_valid(row)
                    && scheduled.value(row) > reported.value(row)
            });
            if over {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Rows flagged by `kind`: time, UE group, demodulation time, HARQ id
    /// and the flag itself
    pub async fn find_events(&self, kind: EventKind) -> Result<RecordBatch> {
        let roles = &self.schema().roles;
        let (flag, code) = match kind {
            EventKind::HarqFail => (roles.harq_fail, 1),
            EventKind::SelfMaintain => (roles.self_maintain, 1),
            EventKind::Dtx => (roles.ack, DTX_CODE),
            EventKind::Dci0Lost => (self.require(roles.dci_lost, "dci0 lost")?, 1),
        };
        let columns = [TIME_COLUMN, UE_COLUMN, roles.dem_time, roles.ack_harq_id, flag];
        let filter = ValueFilter::new().allow(flag, [code]);
        let events = self.view.load(&columns, Some(&filter)).await?.concat()?;
        diagnostics::debug!(
            "{kind}: {count} events",
            kind: kind.to_string(),
            count: events.num_rows()
        );
        Ok(events)
    }

    pub async fn find_harq_fail(&self) -> Result<RecordBatch> {
        self.find_events(EventKind::HarqFail).await
    }

    pub async fn find_self_maintain(&self) -> Result<RecordBatch> {
        self.find_events(EventKind::SelfMaintain).await
    }

    pub async fn find_dtx(&self) -> Result<RecordBatch> {
        self.find_events(EventKind::Dtx).await
    }

    pub async fn find_dci0_lost(&self) -> Result<RecordBatch> {
        self.find_events(EventKind::Dci0Lost).await
    }
}

/// Span covering every view: the interval if one was given, otherwise the
/// union of observed ranges
fn joint_span(views: &[&LogView]) -> Option<TimeInterval> {
    views
        .iter()
        .filter_map(|v| v.interval().or(v.summary().time_range))
        .reduce(|a, b| {
            TimeInterval::new(a.start().min(b.start()), a.end().max(b.end())).unwrap_or(a)
        })
}

/// Rows per bucket for each distinct value of `column`, across several views
pub(crate) async fn presence(
    views: &[&LogView],
    column: &str,
    bucket_secs: f64,
) -> Result<BucketedAggregate> {
    let plan = BucketPlan::new(joint_span(views), bucket_secs)?;
    let mut batches = Vec::new();
    for view in views {
        let outcome = view.load(&[TIME_COLUMN, column], None).await?;
        batches.extend(outcome.batches.into_iter().map(|b| b.batch));
    }
    BucketedAggregate::from_batches(
        &plan,
        &batches,
        &[column.to_string()],
        Reduction::ValueHistogram { ratio: false },
    )
}

/// Value of a `column=value` presence series label
#[must_use]
pub fn series_value(series: &str) -> Option<Value> {
    let (_, value) = series.split_once('=')?;
    Some(value.parse().map_or_else(|_| Value::Text(value.to_string()), Value::Int))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::EngineConfig;
    use crate::filter::IdFilter;
    use crate::source::CsvRecordSource;
    use std::path::Path;

    async fn sched(dir: &Path, log_type: LogType) -> Result<SchedView> {
        let config = EngineConfig::default();
        let catalog = Catalog::build(dir, log_type, None, &config.csv)?;
        let source = Arc::new(CsvRecordSource::new(config.csv.clone())?);
        let view = LogView::open(&catalog, IdFilter::new(), None, source, config).await?;
        Ok(SchedView::new(Arc::new(view)))
    }

    fn write_dl(dir: &Path) -> std::io::Result<()> {
        std::fs::write(
            dir.join("CMAC_dlUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID,ACK.u8AckInfo,ACK.u32DemTime,ACK.u8HarqId,ACK.u8IsHarqFail,\
             ACK.u8IsSelfMainTain,SCHD.u8HarqId,SCHD.u16RbNum,SCHD.u8Layers,SCHD.u32TbSize,\
             SCHD_FAIL_RSN.u32UeSchdFailRsn,LCH_SCHD.u32RlcRptBsr,LCH_SCHD.u32SchdBsr\n\
             10:00:00:000,1,1,0,100,3,0,0,3,10,1,1000,-,500,400\n\
             10:00:00:500,1,2,2,101,4,1,0,4,20,2,2000,6,500,500\n\
             10:00:01:000,1,1,1,102,5,0,1,-,-,7,-,6,-,-\n\
             10:00:01:500,1,2,0,103,6,0,0,6,30,2,3000,40,300,350\n",
        )
    }

    #[tokio::test]
    async fn test_downlink_trends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dl(dir.path())?;
        let dl = sched(dir.path(), LogType::DownlinkScheduler).await?;

        let ues = dl.schd_ue_count(1.0).await?;
        assert_eq!(ues.column("SCHD.u8HarqId"), Some(&[Some(2.0), Some(1.0)][..]));

        let rb = dl.rb_num_trend(1.0).await?;
        assert_eq!(rb.value(0, "SCHD.u16RbNum"), Some(15.0));

        let tput = dl.throughput_kbits(1.0).await?;
        assert_eq!(tput.value(0, "throughput_kbits"), Some(24.0));
        assert_eq!(tput.value(1, "throughput_kbits"), Some(24.0));

        let layers = dl.layer_ratio(1.0).await?;
        assert_eq!(layers.series(), ["SCHD.u8Layers=1", "SCHD.u8Layers=2"]);
        assert_eq!(layers.value(0, "SCHD.u8Layers=1"), Some(0.5));
        assert_eq!(layers.value(1, "SCHD.u8Layers=2"), Some(1.0));

        assert_eq!(dl.dtx_count(1.0).await?.value(0, "dtx"), Some(1.0));
        assert_eq!(dl.harq_fail_count(1.0).await?.value(1, "harq_fail"), Some(0.0));
        assert!(!dl.bsr_enough().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_bler_over() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dl(dir.path())?;
        let dl = sched(dir.path(), LogType::DownlinkScheduler).await?;
        let ts = |s: &str| crate::time::parse_timestamp_text(s).expect("valid test timestamp");
        assert_eq!(
            dl.find_bler_over(0.6, 1.0).await?,
            vec![(ts("2024-03-11 10:00:00"), 1.0)]
        );
        assert!(dl.find_bler_over(1.0, 1.0).await?.is_empty());

        // The middle bucket has no acknowledgement at all
        let gap = tempfile::tempdir()?;
        std::fs::write(
            gap.path().join("CMAC_dlUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID,ACK.u8AckInfo\n\
             10:00:00:000,1,1,1\n\
             10:00:03:000,1,1,2\n",
        )?;
        let dl = sched(gap.path(), LogType::DownlinkScheduler).await?;
        assert_eq!(
            dl.find_bler_over(-1.0, 1.0).await?,
            vec![(ts("2024-03-11 10:00:00"), 0.0), (ts("2024-03-11 10:00:02"), 1.0)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_ta_trend() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("CMAC_dlUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID,SCHD.u8Tac,TA.as16RptTa\n\
             10:00:00:000,1,1,31,4\n\
             10:00:00:500,1,1,33,-\n\
             10:00:01:000,1,1,-,-3\n",
        )?;
        let dl = sched(dir.path(), LogType::DownlinkScheduler).await?;
        let ta = dl.ta_trend().await?;
        assert_eq!(ta.num_rows(), 3);
        assert_eq!(ta.schema().field(1).name(), TAC_ADJUST_COLUMN);
        let adjust = as_int64(ta.column(1), TAC_ADJUST_COLUMN)?;
        assert_eq!(adjust.iter().collect::<Vec<_>>(), vec![Some(0), Some(32), None]);
        let reported = as_int64(ta.column(2), REPORTED_TA)?;
        assert_eq!(reported.iter().collect::<Vec<_>>(), vec![Some(4), None, Some(-3)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fail_reasons_by_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dl(dir.path())?;
        let dl = sched(dir.path(), LogType::DownlinkScheduler).await?;
        assert_eq!(
            dl.fail_reasons().await?,
            vec![("alloc_rb_fail".to_string(), 2), ("unknown(40)".to_string(), 1)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_events() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_dl(dir.path())?;
        let dl = sched(dir.path(), LogType::DownlinkScheduler).await?;

        let harq = dl.find_harq_fail().await?;
        assert_eq!(harq.num_rows(), 1);
        assert_eq!(harq.num_columns(), 5);
        assert_eq!(dl.find_self_maintain().await?.num_rows(), 1);
        assert_eq!(dl.find_dtx().await?.num_rows(), 1);
        // Uplink only
        assert!(matches!(
            dl.find_dci0_lost().await,
            Err(Error::UnknownColumn { .. })
        ));
        assert!(matches!(dl.mcs_trend(1.0).await, Err(Error::UnknownColumn { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_uplink_amc_and_bsr() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("CMAC_ulUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID,CRCI.u8AckInfo,PUSCH_SINR.s16SingleRbSINR,AMC.s16DeltaMcs,\
             AMC.u8StdMcs,BSR.u32LchGrpId,BSR.u32LchGrpBsr,CRCI.u8DciLostFlag\n\
             10:00:00:000,1,1,0,10,-150,12,3,800,0\n\
             10:00:00:500,1,1,2,20,250,14,3,200,1\n\
             10:00:00:700,1,1,0,-,-,-,1,9000,0\n",
        )?;
        let ul = sched(dir.path(), LogType::UplinkScheduler).await?;

        let amc = ul.amc_trend(1.0).await?;
        assert_eq!(amc.value(0, SINGLE_RB_SINR), Some(15.0));
        assert_eq!(amc.value(0, DELTA_MCS), Some(0.5));
        assert_eq!(amc.value(0, STD_MCS), Some(13.0));

        let min = ul.reported_bsr(3, BsrBound::Min, 1.0).await?;
        assert_eq!(min.value(0, LCH_GROUP_BSR), Some(200.0));
        let max = ul.reported_bsr(3, BsrBound::Max, 1.0).await?;
        assert_eq!(max.value(0, LCH_GROUP_BSR), Some(800.0));

        assert_eq!(ul.find_dci0_lost().await?.num_rows(), 1);
        let lost = ul.dci0_lost_ratio(1.0).await?;
        assert!((lost.value(0, "dci0_lost_ratio").expect("defined") - 1.0 / 3.0).abs() < 1e-12);
        assert!(matches!(ul.layer_ratio(1.0).await, Err(Error::UnknownColumn { .. })));
        assert!(matches!(ul.bsr_enough().await, Err(Error::UnknownColumn { .. })));
        assert!(matches!(ul.ta_trend().await, Err(Error::UnknownColumn { .. })));
        Ok(())
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("harq_fail".parse::<EventKind>().ok(), Some(EventKind::HarqFail));
        assert_eq!("DCI0-lost".parse::<EventKind>().ok(), Some(EventKind::Dci0Lost));
        assert!("crash".parse::<EventKind>().is_err());
        assert_eq!(series_value("UEGID=12"), Some(Value::Int(12)));
    }
}
