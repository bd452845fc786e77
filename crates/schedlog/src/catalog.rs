// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Discovery of export files for one log type
//!
//! Export names follow `<subsystem>_<capture stamp>.<ext>`, where the
//! subsystem contains the log type tag. Files carry no end timestamp: a
//! file's coverage runs until the next file starts. Interval selection
//! therefore keeps one look-back file, the last one starting before the
//! interval, because its tail may hold rows inside the interval.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::config::CsvOptions;
use crate::error::{Error, Result};
use crate::schema::LogType;
use crate::time::{TimeInterval, parse_capture_stamp};

/// One export file, immutable once discovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub log_type: LogType,
    pub capture_start: NaiveDateTime,
    pub size_bytes: u64,
}

impl FileDescriptor {
    /// Final path component, for reporting
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Time-ordered export files of one log type in a directory
#[derive(Debug)]
pub struct Catalog {
    directory: PathBuf,
    log_type: LogType,
    files: Vec<FileDescriptor>,
    diagnostics: Vec<Error>,
}

fn filename_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(?P<subsystem>.+)_(?P<stamp>[^_.]+)\.(?P<ext>[^.]+)$"))
        .as_ref()
        .map_err(|e| Error::Regex(e.clone()))
}

/// Split an export filename into (subsystem, capture start).
///
/// Returns `Ok(None)` for names unrelated to `log_type` and
/// `Err(MalformedFilename)` for names that carry the tag but no usable stamp.
fn parse_filename(
    name: &str,
    log_type: LogType,
    extension: &str,
) -> Result<Option<NaiveDateTime>> {
    let has_extension = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
    if !has_extension || !name.contains(log_type.tag()) {
        return Ok(None);
    }

    let malformed = |reason: String| Error::MalformedFilename {
        name: name.to_string(),
        reason,
    };

    let caps = filename_pattern()?
        .captures(name)
        .ok_or_else(|| malformed("expected <subsystem>_<timestamp>.<ext>".to_string()))?;
    let subsystem = &caps["subsystem"];
    if !subsystem.contains(log_type.tag()) {
        return Err(malformed("missing capture timestamp".to_string()));
    }
    parse_capture_stamp(&caps["stamp"])
        .map(Some)
        .map_err(malformed)
}

/// Apply the interval policy to time-sorted files.
///
/// Keeps every file starting inside `[start, end]` plus the file immediately
/// preceding the first file that starts at or after `start`. Files starting
/// after `end` are dropped.
#[must_use]
pub fn select_files(files: &[FileDescriptor], interval: &TimeInterval) -> Vec<FileDescriptor> {
    let first = files.partition_point(|f| f.capture_start < interval.start());
    let look_back = first.saturating_sub(1);
    files[look_back..]
        .iter()
        .take_while(|f| f.capture_start <= interval.end())
        .cloned()
        .collect()
}

impl Catalog {
    /// List `directory` for exports of `log_type`.
    ///
    /// Only a failure to list the directory itself is an error; unparseable
    /// names are skipped and kept as diagnostics.
    pub fn build(
        directory: impl AsRef<Path>,
        log_type: LogType,
        interval: Option<&TimeInterval>,
        options: &CsvOptions,
    ) -> Result<Self> {
        let directory = directory.as_ref();
        let mut files = Vec::new();
        let mut diagnostics = Vec::new();

        for entry in std::fs::read_dir(directory)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_filename(&name, log_type, &options.extension) {
                Ok(Some(capture_start)) => files.push(FileDescriptor {
                    path: entry.path(),
                    log_type,
                    capture_start,
                    size_bytes: metadata.len(),
                }),
                Ok(None) => {}
                Err(err @ Error::Regex(_)) => return Err(err),
                Err(err) => {
                    diagnostics::warn!("skipping {name}: {reason}", name: name.as_str(), reason: err.to_string());
                    diagnostics.push(err);
                }
            }
        }

        // read_dir order is filesystem dependent
        files.sort_by(|a, b| {
            a.capture_start
                .cmp(&b.capture_start)
                .then_with(|| a.path.cmp(&b.path))
        });

        let candidates = files.len();
        if let Some(interval) = interval {
            files = select_files(&files, interval);
        }

        diagnostics::info!(
            "catalog {log_type}: {candidates} candidates, {kept} selected, {skipped} skipped",
            log_type: log_type.short_name(),
            candidates: candidates,
            kept: files.len(),
            skipped: diagnostics.len()
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            log_type,
            files,
            diagnostics,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    #[must_use]
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Files skipped during the build, as `MalformedFilename` errors
    #[must_use]
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_timestamp_text;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp_text(s).expect("valid test timestamp")
    }

    fn descriptor(stamp: &str) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from(format!("CMAC_dlUeTtiInfo_{stamp}.csv")),
            log_type: LogType::DownlinkScheduler,
            capture_start: ts(stamp),
            size_bytes: 0,
        }
    }

    fn starts(files: &[FileDescriptor]) -> Vec<NaiveDateTime> {
        files.iter().map(|f| f.capture_start).collect()
    }

    #[test]
    fn test_parse_filename() {
        let dl = LogType::DownlinkScheduler;
        assert_eq!(
            parse_filename("CMAC_dlUeTtiInfo_20240311101500.csv", dl, "csv").ok(),
            Some(Some(ts("20240311101500")))
        );
        assert_eq!(
            parse_filename("gNB1_CMAC_dlUeTtiInfo_20240311101500.CSV", dl, "csv").ok(),
            Some(Some(ts("20240311101500")))
        );
        // Other log type, other extension
        assert_eq!(
            parse_filename("CMAC_ulUeTtiInfo_20240311101500.csv", dl, "csv").ok(),
            Some(None)
        );
        assert_eq!(
            parse_filename("CMAC_dlUeTtiInfo_20240311101500.bin", dl, "csv").ok(),
            Some(None)
        );
        assert!(matches!(
            parse_filename("CMAC_dlUeTtiInfo_2024bad.csv", dl, "csv"),
            Err(Error::MalformedFilename { .. })
        ));
        assert!(matches!(
            parse_filename("CMAC_dlUeTtiInfo.csv", dl, "csv"),
            Err(Error::MalformedFilename { .. })
        ));
    }

    #[test]
    fn test_select_includes_one_look_back_file() -> Result<()> {
        let files: Vec<_> = ["20240311100000", "20240311100500", "20240311101000", "20240311101500"]
            .iter()
            .map(|s| descriptor(s))
            .collect();
        let interval = TimeInterval::parse("20240311100700", "20240311101200")?;
        let selected = select_files(&files, &interval);
        assert_eq!(
            starts(&selected),
            vec![ts("20240311100500"), ts("20240311101000")]
        );
        Ok(())
    }

    #[test]
    fn test_select_interval_before_all_files() -> Result<()> {
        let files: Vec<_> = ["20240311100000", "20240311100500"]
            .iter()
            .map(|s| descriptor(s))
            .collect();
        let interval = TimeInterval::parse("20240311090000", "20240311093000")?;
        assert!(select_files(&files, &interval).is_empty());
        Ok(())
    }

    #[test]
    fn test_select_interval_after_all_files_keeps_last() -> Result<()> {
        let files: Vec<_> = ["20240311100000", "20240311100500"]
            .iter()
            .map(|s| descriptor(s))
            .collect();
        let interval = TimeInterval::parse("20240311110000", "20240311113000")?;
        assert_eq!(
            starts(&select_files(&files, &interval)),
            vec![ts("20240311100500")]
        );
        Ok(())
    }

    #[test]
    fn test_select_property_bounds() -> Result<()> {
        let stamps = [
            "20240311100000",
            "20240311100100",
            "20240311100200",
            "20240311100300",
            "20240311100400",
            "20240311100500",
        ];
        let files: Vec<_> = stamps.iter().map(|s| descriptor(s)).collect();
        for (i, start) in stamps.iter().enumerate() {
            for end in &stamps[i..] {
                let interval = TimeInterval::parse(start, end)?;
                let selected = select_files(&files, &interval);
                let before: Vec<_> = selected
                    .iter()
                    .filter(|f| f.capture_start < interval.start())
                    .collect();
                assert!(before.len() <= 1);
                assert!(selected.iter().all(|f| f.capture_start <= interval.end()));
                let in_range = files.iter().filter(|f| interval.contains(f.capture_start)).count();
                assert_eq!(selected.len() - before.len(), in_range);
            }
        }
        Ok(())
    }
}
