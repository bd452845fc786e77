// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Log View: filtered, column-projected loads over a set of export files
//!
//! A view is immutable once opened. Loads read files on a bounded pool of
//! blocking workers; each worker fills the slot reserved for its file index
//! and the batches are handed back in capture order, so the output never
//! depends on which read finished first.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, StringArray, TimestampMicrosecondArray};
use arrow::compute::{and, max, min};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_cast::cast::cast;
use arrow_select::concat::concat_batches;
use arrow_select::filter::filter_record_batch;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::catalog::{Catalog, FileDescriptor, select_files};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::filter::{IdFilter, ValueFilter, as_int64};
use crate::schema::{CELL_COLUMN, LogSchema, LogType, TIME_COLUMN, UE_COLUMN};
use crate::source::RecordSource;
use crate::time::{TimeInterval, combine, from_micros, parse_wall_clock, to_micros};

/// Type of the time column once a load has parsed it
#[must_use]
pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

/// A file that could not be read during a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl From<FileFailure> for Error {
    fn from(failure: FileFailure) -> Self {
        Error::FileReadFailure {
            path: failure.path,
            reason: failure.reason,
        }
    }
}

/// Filtered rows of one file
#[derive(Debug, Clone)]
pub struct FileBatch {
    pub file: FileDescriptor,
    pub batch: RecordBatch,
}

/// Result of [`LogView::load`]: batches in capture order plus the files
/// that were skipped in degraded mode
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub schema: SchemaRef,
    pub batches: Vec<FileBatch>,
    pub failures: Vec<FileFailure>,
}

impl LoadOutcome {
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.batch.num_rows()).sum()
    }

    /// All batches as one, in file order
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(
            &self.schema,
            self.batches.iter().map(|b| &b.batch),
        )?)
    }

    /// Batches without their descriptors, in file order
    pub fn record_batches(&self) -> impl Iterator<Item = &RecordBatch> {
        self.batches.iter().map(|b| &b.batch)
    }
}

/// Statistics gathered by the summary pass when a view is opened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_rows: usize,
    /// Observed first and last row timestamps; `None` when no row was read
    pub time_range: Option<TimeInterval>,
    pub cell_ids: BTreeSet<i64>,
    pub ue_group_ids: BTreeSet<i64>,
    /// Observed (cell id, UE group id) combinations
    pub pairs: BTreeSet<(i64, i64)>,
    pub file_count: usize,
    pub size_bytes: u64,
    pub failures: Vec<FileFailure>,
}

impl Summary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    fn observe(&mut self, batch: &RecordBatch) -> Result<()> {
        self.total_rows += batch.num_rows();
        if let Some(time) = batch
            .column_by_name(TIME_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
        {
            let first = min(time).and_then(from_micros);
            let last = max(time).and_then(from_micros);
            if let (Some(first), Some(last)) = (first, last) {
                let (start, end) = match self.time_range {
                    Some(range) => (range.start().min(first), range.end().max(last)),
                    None => (first, last),
                };
                self.time_range = Some(TimeInterval::new(start, end)?);
            }
        }

        let cells = batch
            .column_by_name(CELL_COLUMN)
            .map(|c| as_int64(c, CELL_COLUMN))
            .transpose()?;
        let ues = batch
            .column_by_name(UE_COLUMN)
            .map(|c| as_int64(c, UE_COLUMN))
            .transpose()?;
        for row in 0..batch.num_rows() {
            let cell = cells.as_ref().filter(|c| c.is_valid(row)).map(|c| c.value(row));
            let ue = ues.as_ref().filter(|u| u.is_valid(row)).map(|u| u.value(row));
            if let Some(cell) = cell {
                let _ = self.cell_ids.insert(cell);
            }
            if let Some(ue) = ue {
                let _ = self.ue_group_ids.insert(ue);
            }
            if let (Some(cell), Some(ue)) = (cell, ue) {
                let _ = self.pairs.insert((cell, ue));
            }
        }
        Ok(())
    }
}

/// What each worker needs to turn one raw file into filtered rows
#[derive(Debug)]
struct ReadPlan {
    output: SchemaRef,
    read_columns: Vec<String>,
    filter: ValueFilter,
    interval: Option<TimeInterval>,
    parse_time: bool,
}

impl ReadPlan {
    fn new(
        schema: &LogSchema,
        columns: &[String],
        filter: ValueFilter,
        interval: Option<TimeInterval>,
    ) -> Self {
        let mut output_columns: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !output_columns.contains(column) {
                output_columns.push(column.clone());
            }
        }
        let parse_time = interval.is_some() || output_columns.iter().any(|c| c == TIME_COLUMN);

        let mut read_columns = output_columns.clone();
        let extra = filter
            .columns()
            .map(str::to_string)
            .chain(parse_time.then(|| TIME_COLUMN.to_string()));
        for column in extra {
            if !read_columns.contains(&column) {
                read_columns.push(column);
            }
        }

        let fields: Vec<Field> = output_columns
            .iter()
            .map(|column| {
                let data_type = if column == TIME_COLUMN {
                    timestamp_type()
                } else {
                    schema.raw_type(column)
                };
                Field::new(column, data_type, true)
            })
            .collect();

        Self {
            output: Arc::new(Schema::new(fields)),
            read_columns,
            filter,
            interval,
            parse_time,
        }
    }
}

/// Combine the raw wall clock strings with the file's capture date
fn parse_time_column(raw: &ArrayRef, capture_start: chrono::NaiveDateTime) -> Result<TimestampMicrosecondArray> {
    if let Some(parsed) = raw.as_any().downcast_ref::<TimestampMicrosecondArray>() {
        return Ok(parsed.clone());
    }
    let text = cast(raw, &DataType::Utf8)?;
    let text = text
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::UnknownColumn {
            column: TIME_COLUMN.to_string(),
        })?;
    Ok(text
        .iter()
        .map(|wall| {
            wall.and_then(parse_wall_clock)
                .map(|wall| to_micros(combine(capture_start, wall)))
        })
        .collect())
}

fn combine_masks(left: Option<BooleanArray>, right: Option<BooleanArray>) -> Result<Option<BooleanArray>> {
    Ok(match (left, right) {
        (Some(l), Some(r)) => Some(and(&l, &r)?),
        (l, r) => l.or(r),
    })
}

/// Parse time, clip to the interval, filter by identifier and value, then
/// keep only the requested columns
fn prepare_batch(raw: &RecordBatch, file: &FileDescriptor, plan: &ReadPlan) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = raw.columns().to_vec();
    let mut fields: Vec<Field> = raw
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();

    let mut mask = None;
    if plan.parse_time {
        let idx = raw.schema().index_of(TIME_COLUMN)?;
        let time = parse_time_column(raw.column(idx), file.capture_start)?;
        let unparsed = time.null_count();
        if unparsed > 0 {
            diagnostics::debug!(
                "{file}: dropping {unparsed} rows with unparseable time",
                file: file.name(),
                unparsed: unparsed
            );
        }
        let in_range: BooleanArray = match plan.interval.map(|i| i.micros()) {
            Some((start, end)) => time
                .iter()
                .map(|t| Some(t.is_some_and(|t| start <= t && t <= end)))
                .collect(),
            None => time.iter().map(|t| Some(t.is_some())).collect(),
        };
        mask = Some(in_range);
        columns[idx] = Arc::new(time);
        fields[idx] = Field::new(TIME_COLUMN, timestamp_type(), true);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(raw.num_rows()));
    let parsed = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;

    let mask = combine_masks(mask, plan.filter.mask(&parsed)?)?;
    let filtered = match mask {
        Some(mask) => filter_record_batch(&parsed, &mask)?,
        None => parsed,
    };

    let mut output: Vec<ArrayRef> = Vec::with_capacity(plan.output.fields().len());
    for field in plan.output.fields() {
        let array = filtered
            .column_by_name(field.name())
            .ok_or_else(|| Error::UnknownColumn {
                column: field.name().clone(),
            })?;
        output.push(if array.data_type() == field.data_type() {
            Arc::clone(array)
        } else {
            cast(array, field.data_type())?
        });
    }
    let options = RecordBatchOptions::new().with_row_count(Some(filtered.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(&plan.output),
        output,
        &options,
    )?)
}

fn load_file(source: &dyn RecordSource, file: &FileDescriptor, plan: &ReadPlan) -> Result<RecordBatch> {
    let raw = source.read(file, &plan.read_columns)?;
    prepare_batch(&raw, file, plan)
}

/// Immutable handle over the export files of one log type, restricted by an
/// identifier filter and an optional time interval
#[derive(Debug)]
pub struct LogView {
    log_type: LogType,
    files: Vec<FileDescriptor>,
    id_filter: IdFilter,
    interval: Option<TimeInterval>,
    source: Arc<dyn RecordSource>,
    config: EngineConfig,
    summary: Summary,
}

impl LogView {
    /// Open a view over `catalog`, running the summary pass.
    ///
    /// Fails with `UnknownIdentifier` when `id_filter` restricts anything and
    /// no row survives it.
    pub async fn open(
        catalog: &Catalog,
        id_filter: IdFilter,
        interval: Option<TimeInterval>,
        source: Arc<dyn RecordSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        let files = match &interval {
            Some(interval) => select_files(catalog.files(), interval),
            None => catalog.files().to_vec(),
        };
        Self::with_files(catalog.log_type(), files, id_filter, interval, source, config).await
    }

    async fn with_files(
        log_type: LogType,
        files: Vec<FileDescriptor>,
        id_filter: IdFilter,
        interval: Option<TimeInterval>,
        source: Arc<dyn RecordSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        let mut view = Self {
            log_type,
            files,
            id_filter,
            interval,
            source,
            config,
            summary: Summary::default(),
        };
        view.summary = view.summarize().await?;

        if !view.id_filter.is_empty() && view.summary.is_empty() {
            return Err(Error::UnknownIdentifier {
                filter: view.id_filter.to_string(),
            });
        }

        diagnostics::info!(
            "opened {log_type} view over {files} files: {rows} rows, filter {filter}",
            log_type: log_type.short_name(),
            files: view.files.len(),
            rows: view.summary.total_rows,
            filter: view.id_filter.to_string()
        );
        Ok(view)
    }

    async fn summarize(&self) -> Result<Summary> {
        let outcome = self.load(&[TIME_COLUMN, CELL_COLUMN, UE_COLUMN], None).await?;
        let mut summary = Summary {
            file_count: self.files.len(),
            size_bytes: self.files.iter().map(|f| f.size_bytes).sum(),
            failures: outcome.failures.clone(),
            ..Summary::default()
        };
        for batch in outcome.record_batches() {
            summary.observe(batch)?;
        }
        Ok(summary)
    }

    /// A view over the same files with an additional identifier restriction
    pub async fn narrow(&self, id_filter: &IdFilter) -> Result<Self> {
        let combined = self
            .id_filter
            .and(id_filter)
            .ok_or_else(|| Error::UnknownIdentifier {
                filter: id_filter.to_string(),
            })?;
        Self::with_files(
            self.log_type,
            self.files.clone(),
            combined,
            self.interval,
            Arc::clone(&self.source),
            self.config.clone(),
        )
        .await
    }

    /// Load `columns` from every file, in capture order.
    ///
    /// Rows outside the interval, rows with an unparseable time (whenever
    /// time is parsed), and rows rejected by the identifier filter or by
    /// `filter` are dropped. A file that fails fails the whole load in strict
    /// mode; otherwise it contributes no rows and is listed in the outcome.
    pub async fn load<S: AsRef<str>>(
        &self,
        columns: &[S],
        filter: Option<&ValueFilter>,
    ) -> Result<LoadOutcome> {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let combined = match filter {
            Some(filter) => self.id_filter.and(filter),
            None => Some(self.id_filter.clone()),
        };
        let schema = self.log_type.schema();

        let Some(combined) = combined else {
            // Contradictory restrictions: nothing can match
            let plan = ReadPlan::new(schema, &columns, ValueFilter::new(), self.interval);
            return Ok(LoadOutcome {
                schema: plan.output,
                batches: Vec::new(),
                failures: Vec::new(),
            });
        };
        let plan = Arc::new(ReadPlan::new(schema, &columns, combined, self.interval));

        let semaphore = Arc::new(Semaphore::new(self.config.effective_workers()));
        let mut in_flight = JoinSet::new();
        for (index, file) in self.files.iter().enumerate() {
            let file = file.clone();
            let source = Arc::clone(&self.source);
            let plan = Arc::clone(&plan);
            let semaphore = Arc::clone(&semaphore);
            let _ = in_flight.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, Err(Error::file_read(&file.path, e))),
                };
                let read = tokio::task::spawn_blocking(move || {
                    load_file(source.as_ref(), &file, &plan)
                })
                .await;
                (index, read.map_err(Error::from).and_then(|r| r))
            });
        }

        let mut slots: Vec<Option<Result<RecordBatch>>> =
            std::iter::repeat_with(|| None).take(self.files.len()).collect();
        while let Some(joined) = in_flight.join_next().await {
            let (index, result) = joined?;
            slots[index] = Some(result);
        }

        let mut batches = Vec::with_capacity(self.files.len());
        let mut failures = Vec::new();
        for (file, slot) in self.files.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| Err(Error::file_read(&file.path, "read did not complete")));
            match result {
                Ok(batch) => batches.push(FileBatch {
                    file: file.clone(),
                    batch,
                }),
                Err(err) => failures.push(FileFailure {
                    path: file.path.clone(),
                    reason: err.to_string(),
                }),
            }
        }

        if self.config.strict {
            for failure in &failures {
                diagnostics::error!(
                    "failed to read {path}: {reason}",
                    path: failure.path.display().to_string(),
                    reason: failure.reason.as_str()
                );
            }
            if let Some(first) = failures.first() {
                return Err(first.clone().into());
            }
        } else {
            for failure in &failures {
                diagnostics::warn!(
                    "skipping unreadable {path}: {reason}",
                    path: failure.path.display().to_string(),
                    reason: failure.reason.as_str()
                );
            }
        }

        Ok(LoadOutcome {
            schema: Arc::clone(&plan.output),
            batches,
            failures,
        })
    }

    #[must_use]
    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    #[must_use]
    pub fn schema(&self) -> &'static LogSchema {
        self.log_type.schema()
    }

    #[must_use]
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    #[must_use]
    pub fn id_filter(&self) -> &IdFilter {
        &self.id_filter
    }

    #[must_use]
    pub fn interval(&self) -> Option<TimeInterval> {
        self.interval
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }

    /// Whether `column` is registered for the log type or carried by any
    /// file of the view
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.schema().is_registered(column)
            || self.files.iter().any(|file| {
                self.source
                    .columns(file)
                    .is_ok_and(|names| names.iter().any(|n| n == column))
            })
    }
}
