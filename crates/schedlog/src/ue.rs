// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A UE scheduling group, optionally within one cell

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aggregate::BucketedAggregate;
use crate::error::{Error, Result};
use crate::filter::IdFilter;
use crate::schema::{CELL_COLUMN, LogType};
use crate::sched::{SchedView, presence};
use crate::view::LogView;

#[derive(Debug, Clone)]
pub struct Ue {
    ue_group_id: i64,
    cell_id: Option<i64>,
    dl: Option<SchedView>,
    ul: Option<SchedView>,
}

impl Ue {
    /// Narrow each view by `filter`; directions without a matching row are
    /// left out
    pub(crate) async fn open(
        views: &BTreeMap<LogType, Arc<LogView>>,
        ue_group_id: i64,
        cell_id: Option<i64>,
        filter: &IdFilter,
    ) -> Result<Self> {
        let mut dl = None;
        let mut ul = None;
        for (log_type, view) in views {
            let narrowed = match view.narrow(filter).await {
                Ok(narrowed) => narrowed,
                Err(Error::UnknownIdentifier { .. }) => continue,
                Err(err) => return Err(err),
            };
            let sched = Some(SchedView::new(Arc::new(narrowed)));
            match log_type {
                LogType::DownlinkScheduler => dl = sched,
                LogType::UplinkScheduler => ul = sched,
            }
        }
        if dl.is_none() && ul.is_none() {
            return Err(Error::UnknownIdentifier {
                filter: filter.to_string(),
            });
        }
        Ok(Self {
            ue_group_id,
            cell_id,
            dl,
            ul,
        })
    }

    #[must_use]
    pub fn ue_group_id(&self) -> i64 {
        self.ue_group_id
    }

    /// The cell this UE was looked up in, if any
    #[must_use]
    pub fn cell_id(&self) -> Option<i64> {
        self.cell_id
    }

    #[must_use]
    pub fn dl(&self) -> Option<&SchedView> {
        self.dl.as_ref()
    }

    #[must_use]
    pub fn ul(&self) -> Option<&SchedView> {
        self.ul.as_ref()
    }

    /// Rows per bucket in each cell the UE group was seen in
    pub async fn cell_presence(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let views: Vec<&LogView> = self
            .dl
            .iter()
            .chain(self.ul.iter())
            .map(|s| s.view().as_ref())
            .collect();
        presence(&views, CELL_COLUMN, bucket_secs).await
    }
}
