// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Record sources: column-projected reads of one export file
//!
//! The binary capture decoder is an external tool; what reaches this crate
//! is its tabular output. [`RecordSource`] is the seam between the two so
//! that views never care how a table is stored. [`CsvRecordSource`] reads
//! the decoder's CSV exports with `arrow_csv`.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

use arrow::array::{ArrayRef, new_null_array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_csv::ReaderBuilder;
use arrow_select::concat::concat_batches;
use regex::Regex;

use crate::catalog::FileDescriptor;
use crate::config::CsvOptions;
use crate::error::Result;
use crate::schema::LogSchema;

/// Reads one file's table restricted to a set of columns
pub trait RecordSource: Send + Sync + fmt::Debug {
    /// Return exactly `columns`, in order. The time column comes back as
    /// raw text; requested columns the file lacks come back all-null.
    fn read(&self, file: &FileDescriptor, columns: &[String]) -> Result<RecordBatch>;

    /// Column names the file carries, in file order
    fn columns(&self, file: &FileDescriptor) -> Result<Vec<String>>;
}

/// CSV exports written by the capture decoder
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    options: CsvOptions,
    null_regex: Regex,
}

impl CsvRecordSource {
    pub fn new(options: CsvOptions) -> Result<Self> {
        // The null token marks a missing value; so does a blank field.
        let null_regex = Regex::new(&format!(
            r"^\s*(?:{})?\s*$",
            regex::escape(&options.null_token)
        ))?;
        Ok(Self {
            options,
            null_regex,
        })
    }

    #[must_use]
    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    fn split_header(&self, line: &str) -> Vec<String> {
        line.trim_start_matches('\u{feff}')
            .trim_end_matches(['\r', '\n'])
            .split(self.options.delimiter)
            .map(|name| name.trim().trim_matches('"').to_string())
            .collect()
    }

    /// First line of the file; `None` for an empty file
    fn header(&self, reader: &mut impl BufRead) -> Result<Option<Vec<String>>> {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.split_header(&header)))
    }
}

/// Assemble the requested columns, null-padding the ones the file lacks
fn project_requested(
    batch: Option<&RecordBatch>,
    num_rows: usize,
    columns: &[String],
    schema: &LogSchema,
) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for column in columns {
        let array = batch
            .and_then(|b| b.column_by_name(column).cloned())
            .unwrap_or_else(|| new_null_array(&schema.raw_type(column), num_rows));
        fields.push(Field::new(column, array.data_type().clone(), true));
        arrays.push(array);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

impl RecordSource for CsvRecordSource {
    fn read(&self, file: &FileDescriptor, columns: &[String]) -> Result<RecordBatch> {
        let schema = file.log_type.schema();
        let mut reader = BufReader::new(File::open(&file.path)?);

        let Some(names) = self.header(&mut reader)? else {
            // The decoder writes an empty file for an empty capture window
            return project_requested(None, 0, columns, schema);
        };

        // Only projected columns are decoded, so only they get typed.
        let fields: Vec<Field> = names
            .iter()
            .map(|name| {
                let data_type = if columns.contains(name) {
                    schema.raw_type(name)
                } else {
                    DataType::Utf8
                };
                Field::new(name, data_type, true)
            })
            .collect();

        let mut projection: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, name)| columns.contains(name))
            .map(|(idx, _)| idx)
            .collect();
        if projection.is_empty() {
            // Still need the row count
            projection.push(0);
        }

        let csv = ReaderBuilder::new(Arc::new(Schema::new(fields)))
            .with_header(false)
            .with_delimiter(self.options.delimiter as u8)
            .with_batch_size(self.options.batch_size.max(1))
            .with_null_regex(self.null_regex.clone())
            .with_projection(projection)
            .build(reader)?;
        let projected = csv.schema();

        let batches = csv.collect::<std::result::Result<Vec<_>, _>>()?;
        let batch = concat_batches(&projected, &batches)?;

        diagnostics::debug!(
            "read {rows} rows, {cols} columns from {file}",
            rows: batch.num_rows(),
            cols: columns.len(),
            file: file.name()
        );

        project_requested(Some(&batch), batch.num_rows(), columns, schema)
    }

    fn columns(&self, file: &FileDescriptor) -> Result<Vec<String>> {
        let mut reader = BufReader::new(File::open(&file.path)?);
        Ok(self.header(&mut reader)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LogType, TIME_COLUMN};
    use crate::time::parse_timestamp_text;
    use arrow::array::{Array, Int64Array, StringArray};
    use std::path::Path;

    fn descriptor(path: &Path) -> FileDescriptor {
        FileDescriptor {
            path: path.to_path_buf(),
            log_type: LogType::DownlinkScheduler,
            capture_start: parse_timestamp_text("20240311100000").expect("stamp"),
            size_bytes: 0,
        }
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_projection_and_null_token() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("CMAC_dlUeTtiInfo_20240311100000.csv");
        std::fs::write(
            &path,
            "LocalTime, CellId ,UEGID,ACK.u8AckInfo,Vendor.Note\n\
             10:00:00:000,1,5,0,a\n\
             10:00:00:500,1,5,-,b\n\
             10:00:01:000,7,6,,c\n",
        )?;
        let source = CsvRecordSource::new(CsvOptions::default())?;
        let batch = source.read(
            &descriptor(&path),
            &cols(&["ACK.u8AckInfo", TIME_COLUMN, "CellId"]),
        )?;

        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(0).name(), "ACK.u8AckInfo");
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Utf8);

        let ack = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("int column");
        assert_eq!(ack.value(0), 0);
        assert!(ack.is_null(1));
        assert!(ack.is_null(2));

        let time = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("text column");
        assert_eq!(time.value(2), "10:00:01:000");
        Ok(())
    }

    #[test]
    fn test_missing_columns_are_null_padded() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("CMAC_dlUeTtiInfo_20240311100000.csv");
        std::fs::write(&path, "LocalTime,CellId\n10:00:00:000,1\n10:00:00:001,2\n")?;
        let source = CsvRecordSource::new(CsvOptions::default())?;

        let batch = source.read(&descriptor(&path), &cols(&["SCHD.u16RbNum"]))?;
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(0).null_count(), 2);
        assert_eq!(batch.column(0).data_type(), &DataType::Int64);

        assert_eq!(source.columns(&descriptor(&path))?, cols(&[TIME_COLUMN, "CellId"]));

        let empty = source.read(&descriptor(&path), &[])?;
        assert_eq!(empty.num_rows(), 2);
        assert_eq!(empty.num_columns(), 0);
        Ok(())
    }

    #[test]
    fn test_empty_file_reads_as_no_rows() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("CMAC_dlUeTtiInfo_20240311100000.csv");
        std::fs::write(&path, "")?;
        let source = CsvRecordSource::new(CsvOptions::default())?;
        let batch = source.read(&descriptor(&path), &cols(&["CellId"]))?;
        assert_eq!(batch.num_rows(), 0);
        Ok(())
    }

    #[test]
    fn test_bad_value_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("CMAC_dlUeTtiInfo_20240311100000.csv");
        std::fs::write(&path, "LocalTime,CellId\n10:00:00:000,one\n")?;
        let source = CsvRecordSource::new(CsvOptions::default())?;
        assert!(source.read(&descriptor(&path), &cols(&["CellId"])).is_err());
        // Not decoded, so not an error
        assert!(source.read(&descriptor(&path), &cols(&[TIME_COLUMN])).is_ok());
        Ok(())
    }

    #[test]
    fn test_custom_delimiter() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("CMAC_dlUeTtiInfo_20240311100000.csv");
        std::fs::write(&path, "LocalTime;CellId\n10:00:00:000;NA\n10:00:00:001;4\n")?;
        let options = CsvOptions {
            delimiter: ';',
            null_token: "NA".to_string(),
            ..CsvOptions::default()
        };
        let source = CsvRecordSource::new(options)?;
        let batch = source.read(&descriptor(&path), &cols(&["CellId"]))?;
        assert_eq!(batch.column(0).null_count(), 1);
        Ok(())
    }
}
