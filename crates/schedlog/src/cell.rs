// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A radio cell: both scheduling directions restricted to one cell id

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::aggregate::BucketedAggregate;
use crate::error::{Error, Result};
use crate::filter::IdFilter;
use crate::schema::{LogType, UE_COLUMN};
use crate::sched::{SchedView, presence};
use crate::ue::Ue;
use crate::view::LogView;

/// Row counts of a cell per direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellDescription {
    pub ue_count: usize,
    pub dl_rows: usize,
    pub ul_rows: usize,
}

#[derive(Debug, Clone)]
pub struct Cell {
    id: i64,
    dl: Option<SchedView>,
    ul: Option<SchedView>,
    ue_group_ids: BTreeSet<i64>,
}

impl Cell {
    /// Narrow every view that saw `id` to that cell
    pub(crate) async fn open(views: &BTreeMap<LogType, Arc<LogView>>, id: i64) -> Result<Self> {
        let filter = IdFilter::cell(id);
        let mut dl = None;
        let mut ul = None;
        let mut ue_group_ids = BTreeSet::new();
        for (log_type, view) in views {
            if !view.summary().cell_ids.contains(&id) {
                continue;
            }
            let narrowed = view.narrow(&filter).await?;
            ue_group_ids.extend(narrowed.summary().ue_group_ids.iter().copied());
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
            id,
            dl,
            ul,
            ue_group_ids,
        })
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn dl(&self) -> Option<&SchedView> {
        self.dl.as_ref()
    }

    #[must_use]
    pub fn ul(&self) -> Option<&SchedView> {
        self.ul.as_ref()
    }

    #[must_use]
    pub fn ue_group_ids(&self) -> &BTreeSet<i64> {
        &self.ue_group_ids
    }

    fn directions(&self) -> impl Iterator<Item = &SchedView> {
        self.dl.iter().chain(self.ul.iter())
    }

    #[must_use]
    pub fn describe(&self) -> CellDescription {
        let rows = |s: &Option<SchedView>| s.as_ref().map_or(0, |s| s.view().summary().total_rows);
        CellDescription {
            ue_count: self.ue_group_ids.len(),
            dl_rows: rows(&self.dl),
            ul_rows: rows(&self.ul),
        }
    }

    /// One UE group of this cell
    pub async fn ue(&self, ue_group_id: i64) -> Result<Ue> {
        if !self.ue_group_ids.contains(&ue_group_id) {
            return Err(Error::UnknownIdentifier {
                filter: IdFilter::cell(self.id).allow(UE_COLUMN, [ue_group_id]).to_string(),
            });
        }
        let views: BTreeMap<LogType, Arc<LogView>> = self
            .directions()
            .map(|s| (s.log_type(), Arc::clone(s.view())))
            .collect();
        Ue::open(&views, ue_group_id, Some(self.id), &IdFilter::ue(ue_group_id)).await
    }

    /// Rows per bucket for each UE group of the cell, both directions
    pub async fn ue_presence(&self, bucket_secs: f64) -> Result<BucketedAggregate> {
        let views: Vec<&LogView> = self.directions().map(|s| s.view().as_ref()).collect();
        presence(&views, UE_COLUMN, bucket_secs).await
    }
}
