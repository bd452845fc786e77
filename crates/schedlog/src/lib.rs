// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Scheduler log ingestion and time-bucketed aggregation
//!
//! Base-station L2 scheduler captures are decoded (elsewhere) into one CSV
//! export per capture window. This crate finds those exports, loads them
//! filtered by cell, UE group and time, and reduces them into fixed-width
//! time buckets for trend reporting.
//!
//! ```no_run
//! # async fn demo() -> schedlog::Result<()> {
//! use schedlog::{EngineConfig, IdFilter, LogType, Reduction};
//!
//! let view = schedlog::open_view("/captures", LogType::DownlinkScheduler,
//!     IdFilter::cell(7), None, EngineConfig::default()).await?;
//! let rb = schedlog::aggregate(&view, &["SCHD.u16RbNum"], 1.0, Reduction::Mean, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod analysis;
pub mod catalog;
pub mod cell;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod sched;
pub mod schema;
pub mod source;
pub mod time;
pub mod ue;
pub mod view;

use std::path::Path;
use std::sync::Arc;

pub use aggregate::{BucketPlan, BucketedAggregate, Histogram, Reduction, Value, aggregate, histogram};
pub use analysis::{LogDescription, SchedLog};
pub use catalog::{Catalog, FileDescriptor};
pub use cell::{Cell, CellDescription};
pub use config::{CsvOptions, EngineConfig};
pub use error::{Error, Result};
pub use filter::{ColumnFilter, IdFilter, ValueFilter};
pub use sched::{BsrBound, EventKind, SchedView};
pub use schema::{CELL_COLUMN, LogSchema, LogType, TIME_COLUMN, UE_COLUMN};
pub use source::{CsvRecordSource, RecordSource};
pub use time::TimeInterval;
pub use ue::Ue;
pub use view::{FileBatch, FileFailure, LoadOutcome, LogView, Summary};

/// Catalog `directory` for `log_type` and open a view over it with the CSV
/// record source
pub async fn open_view(
    directory: impl AsRef<Path>,
    log_type: LogType,
    id_filter: IdFilter,
    interval: Option<TimeInterval>,
    config: EngineConfig,
) -> Result<LogView> {
    let catalog = Catalog::build(directory, log_type, interval.as_ref(), &config.csv)?;
    let source = Arc::new(CsvRecordSource::new(config.csv.clone())?);
    LogView::open(&catalog, id_filter, interval, source, config).await
}

/// Summary statistics computed when `view` was opened
#[must_use]
pub fn summarize(view: &LogView) -> &Summary {
    view.summary()
}
