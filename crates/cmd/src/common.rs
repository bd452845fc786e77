// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use schedlog::{BucketedAggregate, EngineConfig, LogType, SchedLog, SchedView, TimeInterval, ValueFilter};

/// Environment variable naming the capture directory when `--dir` is absent
pub const DIR_ENV: &str = "SCHEDLOG_DIR";

/// Get the capture directory with an optional override, falling back to
/// the `SCHEDLOG_DIR` environment variable
pub fn capture_dir_with_override(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }
    env::var(DIR_ENV)
        .map(PathBuf::from)
        .map_err(|_| anyhow!("{DIR_ENV} environment variable not set and no --dir given"))
}

/// Everything a command needs to open the capture directory
#[derive(Debug, Clone)]
pub struct LogContext {
    directory: PathBuf,
    interval: Option<TimeInterval>,
    config: EngineConfig,
}

impl LogContext {
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, interval: Option<TimeInterval>, config: EngineConfig) -> Self {
        Self {
            directory: directory.into(),
            interval,
            config,
        }
    }

    /// Build from the global command line flags.
    ///
    /// `--workers` and `--strict` override the configuration file. Either
    /// interval bound may be given alone; the missing one is left open.
    pub fn from_args(
        directory: Option<PathBuf>,
        config_path: Option<&Path>,
        from: Option<&str>,
        to: Option<&str>,
        workers: Option<usize>,
        strict: bool,
    ) -> Result<Self> {
        let directory = capture_dir_with_override(directory)?;
        let mut config = match config_path {
            Some(path) => EngineConfig::from_yaml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(workers) = workers {
            config = config.with_workers(workers);
        }
        if strict {
            config = config.strict();
        }

        let interval = match (from, to) {
            (None, None) => None,
            (from, to) => Some(TimeInterval::parse(
                from.unwrap_or(OPEN_START),
                to.unwrap_or(OPEN_END),
            )?),
        };
        Ok(Self::new(directory, interval, config))
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn interval(&self) -> Option<TimeInterval> {
        self.interval
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn open_log(&self) -> Result<SchedLog> {
        diagnostics::debug!(
            "opening {dir}",
            dir: self.directory.display().to_string()
        );
        SchedLog::open(&self.directory, self.interval, self.config.clone())
            .await
            .with_context(|| format!("opening {}", self.directory.display()))
    }
}

const OPEN_START: &str = "1970-01-01";
const OPEN_END: &str = "9999-12-31 23:59:59";

/// Restriction of a query to one cell and/or one UE group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    pub cell: Option<i64>,
    pub ue: Option<i64>,
}

impl Scope {
    /// Scheduling queries of `log_type` within this scope
    pub async fn sched(&self, log: &SchedLog, log_type: LogType) -> Result<SchedView> {
        let pick = |dl: Option<&SchedView>, ul: Option<&SchedView>| {
            let found = match log_type {
                LogType::DownlinkScheduler => dl,
                LogType::UplinkScheduler => ul,
            };
            found
                .cloned()
                .ok_or_else(|| anyhow!("no {log_type} rows for {self}"))
        };
        match (self.cell, self.ue) {
            (None, None) => Ok(log.sched(log_type)?),
            (Some(cell), None) => {
                let cell = log.cell(cell).await?;
                pick(cell.dl(), cell.ul())
            }
            (cell, Some(ue)) => {
                let ue = log.ue(ue, cell).await?;
                pick(ue.dl(), ue.ul())
            }
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.cell, self.ue) {
            (None, None) => write!(f, "all cells"),
            (Some(cell), None) => write!(f, "cell {cell}"),
            (None, Some(ue)) => write!(f, "UE group {ue}"),
            (Some(cell), Some(ue)) => write!(f, "UE group {ue} in cell {cell}"),
        }
    }
}

/// Bucket width in seconds: a bare number of seconds or a duration such as
/// `500ms`, `5s`, `1m`
pub fn parse_bucket(text: &str) -> Result<f64> {
    if let Ok(secs) = text.trim().parse::<f64>() {
        return Ok(secs);
    }
    let duration = parse_duration::parse(text).map_err(|e| anyhow!("invalid bucket {text:?}: {e}"))?;
    Ok(duration.as_secs_f64())
}

/// Value filter from `column=v1,v2` clauses; clauses on the same column
/// accumulate
pub fn parse_where(clauses: &[String]) -> Result<Option<ValueFilter>> {
    if clauses.is_empty() {
        return Ok(None);
    }
    let mut filter = ValueFilter::new();
    for clause in clauses {
        let (column, values) = clause
            .split_once('=')
            .ok_or_else(|| anyhow!("expected column=v1,v2 in {clause:?}"))?;
        let values = values
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .map_err(|_| anyhow!("non-integer value {v:?} in {clause:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        filter = filter.allow(column.trim(), values);
    }
    Ok(Some(filter))
}

/// Arrow's table rendering of `batches`
pub fn render(batches: &[RecordBatch]) -> Result<String> {
    Ok(format!("{}\n", pretty_format_batches(batches)?))
}

/// Bucket table followed by one `total` line per series
pub fn render_aggregate(aggregate: &BucketedAggregate) -> Result<String> {
    let mut output = render(&[aggregate.to_record_batch()?])?;
    for (series, total) in aggregate.totals() {
        let total = total.map_or_else(|| "-".to_string(), |t| format!("{t:.4}"));
        output.push_str(&format!("total {series} ({}): {total}\n", aggregate.reduction()));
    }
    Ok(output)
}

/// Human-readable byte count
#[must_use]
pub fn format_file_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{size}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket() -> Result<()> {
        assert_eq!(parse_bucket("2.5")?, 2.5);
        assert_eq!(parse_bucket("500ms")?, 0.5);
        assert_eq!(parse_bucket("1m")?, 60.0);
        assert!(parse_bucket("soon").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_where() -> Result<()> {
        assert!(parse_where(&[])?.is_none());
        let filter = parse_where(&["CellId=7,8".to_string(), "UEGID = 3".to_string()])?;
        let filter = filter.ok_or_else(|| anyhow!("filter"))?;
        assert_eq!(filter.values("CellId").map(|v| v.len()), Some(2));
        assert_eq!(filter.values("UEGID").map(|v| v.len()), Some(1));
        assert!(parse_where(&["CellId".to_string()]).is_err());
        assert!(parse_where(&["CellId=seven".to_string()]).is_err());
        Ok(())
    }

    #[test]
    fn test_from_args() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join("engine.yaml");
        std::fs::write(&config, "workers: 3\n")?;
        let ctx = LogContext::from_args(
            Some(dir.path().to_path_buf()),
            Some(config.as_path()),
            Some("2024-03-11 10:00:00"),
            None,
            None,
            true,
        )?;
        assert_eq!(ctx.config().workers, 3);
        assert!(ctx.config().strict);
        assert!(ctx.interval().is_some_and(|i| i.end().to_string().starts_with("9999")));

        let reversed = LogContext::from_args(
            Some(dir.path().to_path_buf()),
            None,
            Some("20240311110000"),
            Some("20240311100000"),
            Some(1),
            false,
        );
        assert!(reversed.is_err());
        Ok(())
    }

    #[test]
    fn test_scope_display() {
        let scope = Scope {
            cell: Some(7),
            ue: Some(100),
        };
        assert_eq!(scope.to_string(), "UE group 100 in cell 7");
        assert_eq!(Scope::default().to_string(), "all cells");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512B");
        assert_eq!(format_file_size(2048), "2.0KB");
    }
}
