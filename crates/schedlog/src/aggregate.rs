// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Time-bucketed reductions over a [`LogView`]
//!
//! Buckets are fixed-width windows laid over the view's interval, or over
//! the observed time range when the view has none. The last bucket is
//! closed, so a row exactly at the end of the span is still counted.
//! Empty buckets keep "no value" apart from zero: `sum` and `count` report
//! 0, everything else reports `None`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow_cast::cast::{CastOptions, cast, cast_with_options};
use chrono::{Duration, NaiveDateTime};

use crate::error::{Error, Result};
use crate::filter::ValueFilter;
use crate::schema::TIME_COLUMN;
use crate::time::{TimeInterval, from_micros};

/// Upper bound on the buckets of one plan; every series holds one value per
/// bucket
pub const MAX_BUCKETS: usize = 1_000_000;
use crate::view::{LogView, timestamp_type};

/// Reduction applied per bucket and per column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    /// Distinct value counts; with `ratio`, divided by the bucket's number
    /// of non-missing values
    ValueHistogram { ratio: bool },
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::Count => "count",
            Reduction::ValueHistogram { ratio: false } => "hist",
            Reduction::ValueHistogram { ratio: true } => "ratio",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Reduction::Sum),
            "mean" | "avg" => Ok(Reduction::Mean),
            "min" => Ok(Reduction::Min),
            "max" => Ok(Reduction::Max),
            "count" | "cnt" => Ok(Reduction::Count),
            "hist" | "histogram" => Ok(Reduction::ValueHistogram { ratio: false }),
            "ratio" => Ok(Reduction::ValueHistogram { ratio: true }),
            _ => Err(Error::parse("reduction", s)),
        }
    }
}

/// Fixed-width bucket layout over a time span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPlan {
    start: i64,
    end: i64,
    size: i64,
    count: usize,
}

impl BucketPlan {
    /// Lay buckets of `bucket_secs` over `span`; no span means no buckets
    pub fn new(span: Option<TimeInterval>, bucket_secs: f64) -> Result<Self> {
        if !bucket_secs.is_finite() || bucket_secs <= 0.0 {
            return Err(Error::InvalidBucketSize(bucket_secs));
        }
        let size = (bucket_secs * 1_000_000.0).round() as i64;
        if size < 1 {
            return Err(Error::InvalidBucketSize(bucket_secs));
        }
        let Some(span) = span else {
            return Ok(Self {
                start: 0,
                end: 0,
                size,
                count: 0,
            });
        };
        let (start, end) = span.micros();
        let width = u64::try_from(end - start).map_err(|_| Error::InvalidBucketSize(bucket_secs))?;
        let buckets = width.div_ceil(size.unsigned_abs()).max(1);
        let count = usize::try_from(buckets)
            .ok()
            .filter(|count| *count <= MAX_BUCKETS)
            .ok_or(Error::TooManyBuckets {
                buckets,
                max: MAX_BUCKETS,
            })?;
        Ok(Self {
            start,
            end,
            size,
            count,
        })
    }

    /// Buckets over the view's interval, or its observed range without one
    pub fn for_view(view: &LogView, bucket_secs: f64) -> Result<Self> {
        Self::new(
            view.interval().or(view.summary().time_range),
            bucket_secs,
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn size(&self) -> Duration {
        Duration::microseconds(self.size)
    }

    #[must_use]
    pub fn starts(&self) -> Vec<NaiveDateTime> {
        (0..self.count)
            .filter_map(|i| from_micros(self.start + self.size * i as i64))
            .collect()
    }

    /// Bucket of a timestamp, `None` outside the span
    #[must_use]
    pub fn index(&self, micros: i64) -> Option<usize> {
        if self.count == 0 || micros < self.start || micros > self.end {
            return None;
        }
        let idx = usize::try_from((micros - self.start) / self.size).ok()?;
        Some(idx.min(self.count - 1))
    }

    /// Bucket of every row of a loaded batch, from its time column
    pub fn indices(&self, batch: &RecordBatch) -> Result<Vec<Option<usize>>> {
        let time = batch
            .column_by_name(TIME_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| Error::UnknownColumn {
                column: TIME_COLUMN.to_string(),
            })?;
        Ok(time.iter().map(|t| t.and_then(|t| self.index(t))).collect())
    }
}

/// One distinct value seen by a histogram
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Text(_) => 2,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Per-row distinct values of a column; missing values are `None`
fn values_of(array: &ArrayRef) -> Result<Vec<Option<Value>>> {
    Ok(match array.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let ints = cast(array, &DataType::Int64)?;
            ints.as_any()
                .downcast_ref::<Int64Array>()
                .map(|a| a.iter().map(|v| v.map(Value::Int)).collect())
                .unwrap_or_default()
        }
        DataType::Float32 | DataType::Float64 => {
            let floats = cast(array, &DataType::Float64)?;
            floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(|a| {
                    a.iter()
                        .map(|v| {
                            v.map(|v| {
                                if v.fract() == 0.0 && v.abs() < 9.0e15 {
                                    Value::Int(v as i64)
                                } else {
                                    Value::Float(v)
                                }
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
        _ => {
            let text = cast(array, &DataType::Utf8)?;
            text.as_any()
                .downcast_ref::<StringArray>()
                .map(|a| a.iter().map(|v| v.map(|s| Value::Text(s.to_string()))).collect())
                .unwrap_or_default()
        }
    })
}

/// Numeric view of a column; text that is not a number is an error
fn numbers_of(array: &ArrayRef) -> Result<Float64Array> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let floats = cast_with_options(array, &DataType::Float64, &options)?;
    Ok(floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .unwrap_or_else(|| Float64Array::from(Vec::<Option<f64>>::new())))
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn finish(&self, reduction: Reduction) -> Option<f64> {
        match reduction {
            Reduction::Sum => Some(self.sum),
            Reduction::Count => Some(self.count as f64),
            Reduction::Mean => (self.count > 0).then(|| self.sum / self.count as f64),
            Reduction::Min => self.min,
            Reduction::Max => self.max,
            Reduction::ValueHistogram { .. } => None,
        }
    }
}

/// Distinct value counts per bucket for one column
#[derive(Debug)]
struct ValueCounter {
    per_value: BTreeMap<Value, (Vec<u64>, u64)>,
    present: Vec<u64>,
    total_present: u64,
}

impl ValueCounter {
    fn new(buckets: usize) -> Self {
        Self {
            per_value: BTreeMap::new(),
            present: vec![0; buckets],
            total_present: 0,
        }
    }

    fn push(&mut self, bucket: usize, value: Value) {
        let buckets = self.present.len();
        let (counts, total) = self
            .per_value
            .entry(value)
            .or_insert_with(|| (vec![0; buckets], 0));
        counts[bucket] += 1;
        *total += 1;
        self.present[bucket] += 1;
        self.total_present += 1;
    }
}

fn share(count: u64, of: u64, ratio: bool) -> Option<f64> {
    if of == 0 {
        None
    } else if ratio {
        Some(count as f64 / of as f64)
    } else {
        Some(count as f64)
    }
}

/// Ordered `(bucket start, value)` series, one per column (or per
/// `column=value` for histograms), plus whole-span totals
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedAggregate {
    reduction: Reduction,
    bucket_size: Duration,
    buckets: Vec<NaiveDateTime>,
    series: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
    totals: Vec<Option<f64>>,
}

impl BucketedAggregate {
    /// Reduce already loaded batches (each carrying the time column) over
    /// the buckets of `plan`
    pub fn from_batches<'a>(
        plan: &BucketPlan,
        batches: impl IntoIterator<Item = &'a RecordBatch>,
        columns: &[String],
        reduction: Reduction,
    ) -> Result<Self> {
        let buckets = plan.len();
        let batches: Vec<&RecordBatch> = batches.into_iter().collect();
        let mut series = Vec::new();
        let mut values = Vec::new();
        let mut totals = Vec::new();

        match reduction {
            Reduction::ValueHistogram { ratio } => {
                for column in columns {
                    let mut counter = ValueCounter::new(buckets);
                    for batch in &batches {
                        let indices = plan.indices(batch)?;
                        let Some(array) = batch.column_by_name(column) else {
                            continue;
                        };
                        for (idx, value) in indices.into_iter().zip(values_of(array)?) {
                            if let (Some(idx), Some(value)) = (idx, value) {
                                counter.push(idx, value);
                            }
                        }
                    }
                    for (value, (counts, total)) in counter.per_value {
                        series.push(format!("{column}={value}"));
                        values.push(
                            counts
                                .iter()
                                .zip(&counter.present)
                                .map(|(count, present)| share(*count, *present, ratio))
                                .collect(),
                        );
                        totals.push(share(total, counter.total_present, ratio));
                    }
                }
            }
            _ if columns.is_empty() => {
                // Row count
                let mut accumulators = vec![Accumulator::default(); buckets];
                let mut total = Accumulator::default();
                for batch in &batches {
                    for idx in plan.indices(batch)?.into_iter().flatten() {
                        accumulators[idx].push(1.0);
                        total.push(1.0);
                    }
                }
                series.push("count".to_string());
                values.push(accumulators.iter().map(|a| a.finish(Reduction::Count)).collect());
                totals.push(total.finish(Reduction::Count));
            }
            _ => {
                for column in columns {
                    let mut accumulators = vec![Accumulator::default(); buckets];
                    let mut total = Accumulator::default();
                    for batch in &batches {
                        let indices = plan.indices(batch)?;
                        let Some(array) = batch.column_by_name(column) else {
                            continue;
                        };
                        let numbers = numbers_of(array)?;
                        for (idx, value) in indices.into_iter().zip(numbers.iter()) {
                            if let (Some(idx), Some(value)) = (idx, value) {
                                accumulators[idx].push(value);
                                total.push(value);
                            }
                        }
                    }
                    series.push(column.clone());
                    values.push(accumulators.iter().map(|a| a.finish(reduction)).collect());
                    totals.push(total.finish(reduction));
                }
            }
        }

        Ok(Self {
            reduction,
            bucket_size: plan.size(),
            buckets: plan.starts(),
            series,
            values,
            totals,
        })
    }

    /// Assemble from precomputed series, all of `plan.len()` buckets
    pub(crate) fn from_series(
        plan: &BucketPlan,
        reduction: Reduction,
        series: Vec<(String, Vec<Option<f64>>, Option<f64>)>,
    ) -> Self {
        let mut names = Vec::with_capacity(series.len());
        let mut values = Vec::with_capacity(series.len());
        let mut totals = Vec::with_capacity(series.len());
        for (name, vals, total) in series {
            names.push(name);
            values.push(vals);
            totals.push(total);
        }
        Self {
            reduction,
            bucket_size: plan.size(),
            buckets: plan.starts(),
            series: names,
            values,
            totals,
        }
    }

    /// Multiply one series and its total by `factor`, renaming it
    #[must_use]
    pub fn scaled(mut self, series: &str, factor: f64, rename: &str) -> Self {
        if let Some(i) = self.series_index(series) {
            for value in self.values[i].iter_mut().flatten() {
                *value *= factor;
            }
            if let Some(total) = self.totals[i].as_mut() {
                *total *= factor;
            }
            self.series[i] = rename.to_string();
        }
        self
    }

    #[must_use]
    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    #[must_use]
    pub fn bucket_size(&self) -> Duration {
        self.bucket_size
    }

    /// Bucket start times, ascending
    #[must_use]
    pub fn buckets(&self) -> &[NaiveDateTime] {
        &self.buckets
    }

    #[must_use]
    pub fn series(&self) -> &[String] {
        &self.series
    }

    fn series_index(&self, series: &str) -> Option<usize> {
        self.series.iter().position(|s| s == series)
    }

    /// All bucket values of one series
    #[must_use]
    pub fn column(&self, series: &str) -> Option<&[Option<f64>]> {
        self.series_index(series).map(|i| self.values[i].as_slice())
    }

    /// Value of `series` in bucket `bucket`; `None` when the bucket has no
    /// value (or either index is out of range)
    #[must_use]
    pub fn value(&self, bucket: usize, series: &str) -> Option<f64> {
        self.series_index(series)
            .and_then(|i| self.values[i].get(bucket).copied().flatten())
    }

    /// Reduction over the whole span, per series
    #[must_use]
    pub fn totals(&self) -> Vec<(&str, Option<f64>)> {
        self.series
            .iter()
            .map(String::as_str)
            .zip(self.totals.iter().copied())
            .collect()
    }

    /// `(bucket start, value)` pairs of one series
    #[must_use]
    pub fn points(&self, series: &str) -> Vec<(NaiveDateTime, Option<f64>)> {
        self.column(series)
            .map(|vals| self.buckets.iter().copied().zip(vals.iter().copied()).collect())
            .unwrap_or_default()
    }

    /// One row per bucket: `bucket_start` then one column per series
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = vec![Field::new("bucket_start", timestamp_type(), false)];
        let starts: TimestampMicrosecondArray = self
            .buckets
            .iter()
            .map(|b| Some(crate::time::to_micros(*b)))
            .collect();
        let mut columns: Vec<ArrayRef> = vec![Arc::new(starts)];
        for (name, vals) in self.series.iter().zip(&self.values) {
            fields.push(Field::new(name, DataType::Float64, true));
            columns.push(Arc::new(Float64Array::from(vals.clone())));
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

fn check_columns(view: &LogView, columns: &[String]) -> Result<()> {
    match columns.iter().find(|c| !view.has_column(c)) {
        Some(column) => Err(Error::UnknownColumn {
            column: column.clone(),
        }),
        None => Ok(()),
    }
}

/// Bucket `columns` of `view` by `bucket_secs` and reduce each bucket.
///
/// `Count` without columns counts rows. Every other reduction needs at least
/// one column.
pub async fn aggregate<S: AsRef<str>>(
    view: &LogView,
    columns: &[S],
    bucket_secs: f64,
    reduction: Reduction,
    filter: Option<&ValueFilter>,
) -> Result<BucketedAggregate> {
    let plan = BucketPlan::for_view(view, bucket_secs)?;
    let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
    if columns.is_empty() && reduction != Reduction::Count {
        return Err(Error::EmptyProjection);
    }
    check_columns(view, &columns)?;

    let mut load: Vec<&str> = vec![TIME_COLUMN];
    load.extend(columns.iter().map(String::as_str));
    let outcome = view.load(&load, filter).await?;

    let result = BucketedAggregate::from_batches(&plan, outcome.record_batches(), &columns, reduction)?;
    diagnostics::debug!(
        "{reduction} over {series} series, {buckets} buckets from {rows} rows",
        reduction: reduction.to_string(),
        series: result.series().len(),
        buckets: result.buckets().len(),
        rows: outcome.num_rows()
    );
    Ok(result)
}

/// Whole-view distinct value counts of one column
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub column: String,
    pub counts: Vec<(Value, u64)>,
}

impl Histogram {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    #[must_use]
    pub fn count(&self, value: &Value) -> u64 {
        self.counts
            .iter()
            .find(|(v, _)| v == value)
            .map_or(0, |(_, n)| *n)
    }

    /// Share of `value` among all non-missing values; `None` when there are none
    #[must_use]
    pub fn ratio(&self, value: &Value) -> Option<f64> {
        share(self.count(value), self.total(), true)
    }

    /// `value`, `count`, `ratio` columns
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let total = self.total();
        let values: StringArray = self.counts.iter().map(|(v, _)| Some(v.to_string())).collect();
        let counts: UInt64Array = self.counts.iter().map(|(_, n)| Some(*n)).collect();
        let ratios: Float64Array = self
            .counts
            .iter()
            .map(|(_, n)| share(*n, total, true))
            .collect();
        let schema = Schema::new(vec![
            Field::new(&self.column, DataType::Utf8, false),
            Field::new("count", DataType::UInt64, false),
            Field::new("ratio", DataType::Float64, true),
        ]);
        Ok(RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(values), Arc::new(counts), Arc::new(ratios)],
        )?)
    }
}

/// Distinct value counts of `column` over the whole view
pub async fn histogram(view: &LogView, column: &str, filter: Option<&ValueFilter>) -> Result<Histogram> {
    check_columns(view, &[column.to_string()])?;
    let outcome = view.load(&[column], filter).await?;
    let mut counts: BTreeMap<Value, u64> = BTreeMap::new();
    for batch in outcome.record_batches() {
        for value in values_of(batch.column(0))?.into_iter().flatten() {
            *counts.entry(value).or_default() += 1;
        }
    }
    Ok(Histogram {
        column: column.to_string(),
        counts: counts.into_iter().collect(),
    })
}
