// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Test helpers shared by the scheduler log crates
//!
//! Builders for decoder CSV exports and a canned capture directory with a
//! known row layout, so integration tests can assert exact aggregates.
//!
//! ```toml
//! [dev-dependencies]
//! utilities = { path = "../utilities" }
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tempfile::TempDir;

/// Test helper error type for better error chaining
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("General error: {0}")]
    General(String),
}

pub type TestResult<T> = Result<T, TestError>;

/// Filename tag of downlink scheduler exports
pub const DOWNLINK_TAG: &str = "CMAC_dlUeTtiInfo";
/// Filename tag of uplink scheduler exports
pub const UPLINK_TAG: &str = "CMAC_ulUeTtiInfo";

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Parse `YYYY-MM-DD hh:mm:ss[.fff]`
pub fn stamp(text: &str) -> TestResult<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")?)
}

/// The decoder's wall-clock rendering, `hh:mm:ss:mmm`
#[must_use]
pub fn wall_clock(ts: NaiveDateTime) -> String {
    ts.format("%H:%M:%S:%3f").to_string()
}

// ============================================================================
// EXPORT BUILDER
// ============================================================================

/// One decoder export file under construction
///
/// ```ignore
/// let path = ExportFile::downlink(stamp("2024-03-11 10:00:00")?)
///     .columns(["LocalTime", "CellId", "UEGID"])
///     .row(["10:00:00:000", "7", "100"])
///     .write(dir.path())?;
/// ```
#[derive(Debug, Clone)]
pub struct ExportFile {
    tag: String,
    start: NaiveDateTime,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    delimiter: char,
    extension: String,
}

impl ExportFile {
    #[must_use]
    pub fn new(tag: &str, start: NaiveDateTime) -> Self {
        Self {
            tag: tag.to_string(),
            start,
            header: Vec::new(),
            rows: Vec::new(),
            delimiter: ',',
            extension: "csv".to_string(),
        }
    }

    #[must_use]
    pub fn downlink(start: NaiveDateTime) -> Self {
        Self::new(DOWNLINK_TAG, start)
    }

    #[must_use]
    pub fn uplink(start: NaiveDateTime) -> Self {
        Self::new(UPLINK_TAG, start)
    }

    #[must_use]
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn row<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        self.rows.push(values.into_iter().map(|v| v.to_string()).collect());
        self
    }

    #[must_use]
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.tag,
            self.start.format("%Y%m%d%H%M%S"),
            self.extension
        )
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Render the header and rows; every row must match the header width
    pub fn render(&self) -> TestResult<String> {
        let sep = self.delimiter.to_string();
        let mut text = self.header.join(&sep);
        text.push('\n');
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.header.len() {
                return Err(TestError::General(format!(
                    "row {i} has {} fields, header has {}",
                    row.len(),
                    self.header.len()
                )));
            }
            text.push_str(&row.join(&sep));
            text.push('\n');
        }
        Ok(text)
    }

    /// Write into `dir`, returning the file path
    pub fn write(&self, dir: &Path) -> TestResult<PathBuf> {
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.render()?)?;
        Ok(path)
    }
}

// ============================================================================
// SAMPLE CAPTURE
// ============================================================================

/// Downlink columns written by [`sample_capture`]
pub const SAMPLE_DOWNLINK_COLUMNS: [&str; 13] = [
    "LocalTime",
    "CellId",
    "UEGID",
    "ACK.u8AckInfo",
    "ACK.u32DemTime",
    "ACK.u8HarqId",
    "ACK.u8IsHarqFail",
    "ACK.u8IsSelfMainTain",
    "SCHD.u8HarqId",
    "SCHD.u16RbNum",
    "SCHD.u8Layers",
    "SCHD.u32TbSize",
    "SCHD_FAIL_RSN.u32UeSchdFailRsn",
];

/// Uplink columns written by [`sample_capture`]
pub const SAMPLE_UPLINK_COLUMNS: [&str; 10] = [
    "LocalTime",
    "CellId",
    "UEGID",
    "CRCI.u8AckInfo",
    "CRCI.u32DemTime",
    "CRCI.u8HarqId",
    "CRCI.u8DciLostFlag",
    "GRANT.u16RbNum",
    "TB.u8Mcs",
    "TB.u16TbSize",
];

/// Spacing between consecutive sample rows
pub const SAMPLE_ROW_SPACING_MS: i64 = 250;
/// Downlink rows per sample export; two exports are written
pub const SAMPLE_DOWNLINK_ROWS_PER_FILE: usize = 8;
pub const SAMPLE_UPLINK_ROWS: usize = 12;

/// Downlink sample row `i`, starting at `base`:
///
/// - at `base + i * 250ms`
/// - cell 7 for even `i`, 8 for odd
/// - UE group `100 + i % 4`
/// - ack code `i % 3`, demodulation time `i`
/// - HARQ failure when `i % 5 == 4`, self-maintained when `i % 8 == 7`
/// - `10 * (i % 4 + 1)` resource blocks, `1 + i % 2` layers, 1000 byte TB
/// - fail reason 5 when `i % 4 == 3`, missing otherwise
#[must_use]
pub fn sample_downlink_row(base: NaiveDateTime, i: usize) -> Vec<String> {
    let n = i as i64;
    let at = base + Duration::milliseconds(n * SAMPLE_ROW_SPACING_MS);
    let reason = if i % 4 == 3 { "5".to_string() } else { "-".to_string() };
    vec![
        wall_clock(at),
        (if i % 2 == 0 { 7 } else { 8 }).to_string(),
        (100 + i % 4).to_string(),
        (i % 3).to_string(),
        i.to_string(),
        (i % 8).to_string(),
        u8::from(i % 5 == 4).to_string(),
        u8::from(i % 8 == 7).to_string(),
        (i % 8).to_string(),
        (10 * (i % 4 + 1)).to_string(),
        (1 + i % 2).to_string(),
        "1000".to_string(),
        reason,
    ]
}

/// Uplink sample row `i`, starting at `base`:
///
/// - at `base + i * 250ms`
/// - cell 7 for `i < 6`, 9 after
/// - UE group 100 for even `i`, 102 for odd
/// - ack code and DCI-lost flag `i % 3`, demodulation time `i`
/// - `5 * (i % 2 + 1)` resource blocks, MCS `i`, 200 byte TB
#[must_use]
pub fn sample_uplink_row(base: NaiveDateTime, i: usize) -> Vec<String> {
    let n = i as i64;
    let at = base + Duration::milliseconds(n * SAMPLE_ROW_SPACING_MS);
    vec![
        wall_clock(at),
        (if i < 6 { 7 } else { 9 }).to_string(),
        (100 + 2 * (i % 2)).to_string(),
        (i % 3).to_string(),
        i.to_string(),
        (i % 8).to_string(),
        (i % 3).to_string(),
        (5 * (i % 2 + 1)).to_string(),
        i.to_string(),
        "200".to_string(),
    ]
}

/// Write the sample capture into `dir`:
///
/// - two downlink exports stamped 10:00:00 and 10:00:02 on 2024-03-11,
///   rows 0..8 and 8..16 of [`sample_downlink_row`]
/// - one uplink export stamped 10:00:00 with rows 0..12 of
///   [`sample_uplink_row`]
/// - a downlink-tagged file with an unparseable stamp and an unrelated file
pub fn write_sample_capture(dir: &Path) -> TestResult<()> {
    let base = stamp("2024-03-11 10:00:00")?;
    for part in 0..2 {
        let first = part * SAMPLE_DOWNLINK_ROWS_PER_FILE;
        let start = base + Duration::milliseconds(first as i64 * SAMPLE_ROW_SPACING_MS);
        let mut export = ExportFile::downlink(start).columns(SAMPLE_DOWNLINK_COLUMNS);
        for i in first..first + SAMPLE_DOWNLINK_ROWS_PER_FILE {
            export = export.row(sample_downlink_row(base, i));
        }
        let _ = export.write(dir)?;
    }

    let mut uplink = ExportFile::uplink(base).columns(SAMPLE_UPLINK_COLUMNS);
    for i in 0..SAMPLE_UPLINK_ROWS {
        uplink = uplink.row(sample_uplink_row(base, i));
    }
    let _ = uplink.write(dir)?;

    std::fs::write(dir.join(format!("{DOWNLINK_TAG}_notastamp.csv")), "")?;
    std::fs::write(dir.join("README.txt"), "capture notes")?;
    Ok(())
}

/// A temporary directory holding [`write_sample_capture`]
pub fn sample_capture() -> TestResult<TempDir> {
    let dir = tempfile::tempdir()?;
    write_sample_capture(dir.path())?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_and_render() -> TestResult<()> {
        let export = ExportFile::uplink(stamp("2024-03-11 23:59:58")?)
            .columns(["LocalTime", "CellId"])
            .row(["23:59:58:000", "1"])
            .delimiter('|')
            .extension("txt");
        assert_eq!(export.file_name(), "CMAC_ulUeTtiInfo_20240311235958.txt");
        assert_eq!(export.render()?, "LocalTime|CellId\n23:59:58:000|1\n");
        Ok(())
    }

    #[test]
    fn test_ragged_row_is_rejected() -> TestResult<()> {
        let export = ExportFile::downlink(stamp("2024-03-11 10:00:00")?)
            .columns(["LocalTime", "CellId"])
            .row(["10:00:00:000"]);
        assert!(matches!(export.render(), Err(TestError::General(_))));
        Ok(())
    }

    #[test]
    fn test_wall_clock_millis() -> TestResult<()> {
        assert_eq!(wall_clock(stamp("2024-03-11 10:00:01.250")?), "10:00:01:250");
        Ok(())
    }

    #[test]
    fn test_sample_capture_layout() -> TestResult<()> {
        let dir = sample_capture()?;
        let mut names: Vec<String> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "CMAC_dlUeTtiInfo_20240311100000.csv",
                "CMAC_dlUeTtiInfo_20240311100002.csv",
                "CMAC_dlUeTtiInfo_notastamp.csv",
                "CMAC_ulUeTtiInfo_20240311100000.csv",
                "README.txt",
            ]
        );
        let second = std::fs::read_to_string(dir.path().join("CMAC_dlUeTtiInfo_20240311100002.csv"))?;
        assert_eq!(second.lines().count(), SAMPLE_DOWNLINK_ROWS_PER_FILE + 1);
        assert!(second.lines().nth(1).is_some_and(|l| l.starts_with("10:00:02:000,7,100,2,8,")));
        Ok(())
    }
}
