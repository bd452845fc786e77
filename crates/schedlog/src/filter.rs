// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Row restrictions by column value

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array};
use arrow::compute::and;
use arrow::record_batch::RecordBatch;
use arrow_cast::cast::{CastOptions, cast_with_options};
use arrow_schema::DataType;

use crate::error::{Error, Result};
use crate::schema::{CELL_COLUMN, UE_COLUMN};

/// Allowed values per column; a column with an empty set is unrestricted.
///
/// Used both as the identifier filter bound to a view (cell, UE group) and
/// as the per-query value filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFilter {
    allowed: BTreeMap<String, BTreeSet<i64>>,
}

/// Identifier restriction bound to a [`crate::LogView`]
pub type IdFilter = ColumnFilter;
/// Per-query restriction applied on top of a view's identifier filter
pub type ValueFilter = ColumnFilter;

impl ColumnFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `column` to `values`, extending any earlier restriction
    #[must_use]
    pub fn allow(mut self, column: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        self.allowed.entry(column.into()).or_default().extend(values);
        self
    }

    #[must_use]
    pub fn cell(id: i64) -> Self {
        Self::new().allow(CELL_COLUMN, [id])
    }

    #[must_use]
    pub fn ue(id: i64) -> Self {
        Self::new().allow(UE_COLUMN, [id])
    }

    /// Both filters at once: shared columns keep the intersection of their
    /// values. `None` when a shared column's intersection is empty, i.e.
    /// nothing can match.
    #[must_use]
    pub fn and(&self, other: &ColumnFilter) -> Option<Self> {
        let mut combined = self.clone();
        for (column, values) in other.active() {
            match combined.allowed.get_mut(column).filter(|v| !v.is_empty()) {
                Some(existing) => {
                    existing.retain(|v| values.contains(v));
                    if existing.is_empty() {
                        return None;
                    }
                }
                None => {
                    let _ = combined.allowed.insert(column.clone(), values.clone());
                }
            }
        }
        Some(combined)
    }

    /// Columns with an active restriction
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.active().map(|(column, _)| column.as_str())
    }

    #[must_use]
    pub fn values(&self, column: &str) -> Option<&BTreeSet<i64>> {
        self.allowed.get(column).filter(|v| !v.is_empty())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    fn active(&self) -> impl Iterator<Item = (&String, &BTreeSet<i64>)> {
        self.allowed.iter().filter(|(_, values)| !values.is_empty())
    }

    /// Row mask for `batch`: true where every restricted column holds an
    /// allowed, non-missing value. A restricted column absent from the batch
    /// matches nothing.
    pub fn mask(&self, batch: &RecordBatch) -> Result<Option<BooleanArray>> {
        let mut mask: Option<BooleanArray> = None;
        for (column, values) in self.active() {
            let column_mask = match batch.column_by_name(column) {
                Some(array) => {
                    let ints = as_int64(array, column)?;
                    ints.iter()
                        .map(|v| Some(v.is_some_and(|v| values.contains(&v))))
                        .collect::<BooleanArray>()
                }
                None => BooleanArray::from(vec![false; batch.num_rows()]),
            };
            mask = Some(match mask {
                Some(existing) => and(&existing, &column_mask)?,
                None => column_mask,
            });
        }
        Ok(mask)
    }
}

impl fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(no restriction)");
        }
        let parts: Vec<String> = self
            .active()
            .map(|(column, values)| {
                let values: Vec<String> = values.iter().map(i64::to_string).collect();
                format!("{column}=[{}]", values.join(","))
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// View an identifier or code column as integers.
///
/// Text that is not an integer fails rather than turning into a missing value.
pub(crate) fn as_int64(array: &ArrayRef, column: &str) -> Result<Int64Array> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let cast = cast_with_options(array, &DataType::Int64, &options)?;
    cast.as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| Error::UnknownColumn {
            column: column.to_string(),
        })
}
