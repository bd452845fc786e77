// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Directory-level handle over every scheduler log type

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::future::try_join_all;

use crate::catalog::Catalog;
use crate::cell::Cell;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::filter::IdFilter;
use crate::schema::LogType;
use crate::sched::SchedView;
use crate::source::{CsvRecordSource, RecordSource};
use crate::time::TimeInterval;
use crate::ue::Ue;
use crate::view::{FileFailure, LogView};

/// What [`SchedLog::describe`] reports per log type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDescription {
    pub log_type: LogType,
    pub files: usize,
    pub size_bytes: u64,
    pub rows: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    /// Export names that were skipped by the catalog
    pub skipped: usize,
    pub failures: Vec<FileFailure>,
}

/// One capture directory: catalogs and unrestricted views per log type
#[derive(Debug)]
pub struct SchedLog {
    directory: PathBuf,
    interval: Option<TimeInterval>,
    config: EngineConfig,
    catalogs: BTreeMap<LogType, Catalog>,
    views: BTreeMap<LogType, Arc<LogView>>,
}

impl SchedLog {
    /// Open `directory` with the CSV record source
    pub async fn open(
        directory: impl AsRef<Path>,
        interval: Option<TimeInterval>,
        config: EngineConfig,
    ) -> Result<Self> {
        let source = Arc::new(CsvRecordSource::new(config.csv.clone())?);
        Self::with_source(directory, interval, config, source).await
    }

    pub async fn with_source(
        directory: impl AsRef<Path>,
        interval: Option<TimeInterval>,
        config: EngineConfig,
        source: Arc<dyn RecordSource>,
    ) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let mut catalogs = BTreeMap::new();
        for log_type in LogType::ALL {
            let catalog = Catalog::build(&directory, log_type, interval.as_ref(), &config.csv)?;
            let _ = catalogs.insert(log_type, catalog);
        }

        // Summary passes of the log types run side by side
        let opened = try_join_all(catalogs.values().filter(|c| !c.is_empty()).map(|catalog| {
            let source = Arc::clone(&source);
            let config = config.clone();
            async move {
                let view = LogView::open(catalog, IdFilter::new(), interval, source, config).await?;
                Ok::<_, Error>((catalog.log_type(), Arc::new(view)))
            }
        }))
        .await?;
        let views: BTreeMap<LogType, Arc<LogView>> = opened.into_iter().collect();

        Ok(Self {
            directory,
            interval,
            config,
            catalogs,
            views,
        })
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

    /// Log types with at least one export file
    pub fn log_types(&self) -> impl Iterator<Item = LogType> + '_ {
        self.views.keys().copied()
    }

    /// Unrestricted view of one log type
    pub fn view(&self, log_type: LogType) -> Result<Arc<LogView>> {
        self.views
            .get(&log_type)
            .cloned()
            .ok_or_else(|| Error::NoLogFiles {
                log_type: log_type.to_string(),
            })
    }

    /// Scheduling queries over the whole directory for one log type
    pub fn sched(&self, log_type: LogType) -> Result<SchedView> {
        self.view(log_type).map(SchedView::new)
    }

    #[must_use]
    pub fn describe(&self) -> Vec<LogDescription> {
        LogType::ALL
            .into_iter()
            .map(|log_type| {
                let skipped = self
                    .catalogs
                    .get(&log_type)
                    .map_or(0, |c| c.diagnostics().len());
                match self.views.get(&log_type) {
                    Some(view) => {
                        let summary = view.summary();
                        LogDescription {
                            log_type,
                            files: summary.file_count,
                            size_bytes: summary.size_bytes,
                            rows: summary.total_rows,
                            first: summary.time_range.map(|r| r.start()),
                            last: summary.time_range.map(|r| r.end()),
                            skipped,
                            failures: summary.failures.clone(),
                        }
                    }
                    None => LogDescription {
                        log_type,
                        files: 0,
                        size_bytes: 0,
                        rows: 0,
                        first: None,
                        last: None,
                        skipped,
                        failures: Vec::new(),
                    },
                }
            })
            .collect()
    }

    /// Cell ids seen in any log type
    #[must_use]
    pub fn cell_ids(&self) -> BTreeSet<i64> {
        self.views
            .values()
            .flat_map(|v| v.summary().cell_ids.iter().copied())
            .collect()
    }

    /// (cell id, UE group id) pairs seen in any log type
    #[must_use]
    pub fn cell_and_ue_ids(&self) -> BTreeSet<(i64, i64)> {
        self.views
            .values()
            .flat_map(|v| v.summary().pairs.iter().copied())
            .collect()
    }

    pub async fn cell(&self, cell_id: i64) -> Result<Cell> {
        Cell::open(&self.views, cell_id).await
    }

    /// A UE group, optionally within one cell
    pub async fn ue(&self, ue_group_id: i64, cell_id: Option<i64>) -> Result<Ue> {
        let mut filter = IdFilter::ue(ue_group_id);
        if let Some(cell_id) = cell_id {
            filter = filter.allow(crate::schema::CELL_COLUMN, [cell_id]);
        }
        let known = self.views.values().any(|v| {
            v.summary().pairs.iter().any(|(cell, ue)| {
                *ue == ue_group_id && cell_id.is_none_or(|c| c == *cell)
            })
        });
        if !known {
            return Err(Error::UnknownIdentifier {
                filter: filter.to_string(),
            });
        }
        Ue::open(&self.views, ue_group_id, cell_id, &filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CELL_COLUMN, UE_COLUMN};

    fn write_directory(dir: &Path) -> std::io::Result<()> {
        std::fs::write(
            dir.join("CMAC_dlUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID,ACK.u8AckInfo\n\
             10:00:00:000,1,10,0\n\
             10:00:01:000,1,11,1\n\
             10:00:02:000,2,20,0\n",
        )?;
        std::fs::write(
            dir.join("CMAC_ulUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID,CRCI.u8AckInfo\n\
             10:00:00:500,1,10,0\n\
             10:00:03:000,3,30,2\n",
        )?;
        std::fs::write(dir.join("CMAC_dlUeTtiInfo_garbage.csv"), "")?;
        std::fs::write(dir.join("notes.txt"), "unrelated")
    }

    #[tokio::test]
    async fn test_describe_and_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_directory(dir.path())?;
        let log = SchedLog::open(dir.path(), None, EngineConfig::default()).await?;

        let described = log.describe();
        assert_eq!(described.len(), 2);
        assert_eq!(described[0].log_type, LogType::DownlinkScheduler);
        assert_eq!(described[0].rows, 3);
        assert_eq!(described[0].skipped, 1);
        assert_eq!(described[1].rows, 2);

        assert_eq!(log.cell_ids(), BTreeSet::from([1, 2, 3]));
        assert!(log.cell_and_ue_ids().contains(&(3, 30)));
        Ok(())
    }

    #[tokio::test]
    async fn test_cell_and_ue_lookup() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_directory(dir.path())?;
        let log = SchedLog::open(dir.path(), None, EngineConfig::default()).await?;

        let cell = log.cell(1).await?;
        assert_eq!(cell.ue_group_ids(), &BTreeSet::from([10, 11]));
        let description = cell.describe();
        assert_eq!(description.ue_count, 2);
        assert_eq!(description.dl_rows, 2);
        assert_eq!(description.ul_rows, 1);

        // Cell 3 only appears in the uplink export
        let cell3 = log.cell(3).await?;
        assert!(cell3.dl().is_none());
        assert!(cell3.ul().is_some());

        assert!(matches!(log.cell(99).await, Err(Error::UnknownIdentifier { .. })));
        assert!(matches!(
            log.ue(10, Some(2)).await,
            Err(Error::UnknownIdentifier { .. })
        ));

        let ue = log.ue(10, None).await?;
        let filter = ue.dl().map(|s| s.view().id_filter().clone());
        assert_eq!(filter, Some(IdFilter::ue(10)));
        let ue = log.ue(10, Some(1)).await?;
        let values = ue.dl().and_then(|s| s.view().id_filter().values(CELL_COLUMN).cloned());
        assert_eq!(values, Some(BTreeSet::from([1])));
        assert!(ue.dl().is_some_and(|s| s.view().id_filter().values(UE_COLUMN).is_some()));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_log_type() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("CMAC_ulUeTtiInfo_20240311100000.csv"),
            "LocalTime,CellId,UEGID\n10:00:00:000,1,1\n",
        )?;
        let log = SchedLog::open(dir.path(), None, EngineConfig::default()).await?;
        assert!(matches!(
            log.sched(LogType::DownlinkScheduler),
            Err(Error::NoLogFiles { .. })
        ));
        assert!(log.sched(LogType::UplinkScheduler).is_ok());
        assert_eq!(log.log_types().collect::<Vec<_>>(), vec![LogType::UplinkScheduler]);
        Ok(())
    }
}
