// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use schedlog::{LogType, Reduction, ValueFilter};

use crate::common::{LogContext, Scope, render_aggregate};

/// Trend command - reduces columns into fixed-width time buckets
pub async fn trend_command<F>(
    ctx: &LogContext,
    log_type: LogType,
    scope: Scope,
    columns: &[String],
    reduction: Reduction,
    bucket_secs: f64,
    filter: Option<&ValueFilter>,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    diagnostics::debug!(
        "trend_command {reduction} of {columns} over {scope}",
        reduction: reduction.to_string(),
        columns: columns.join(","),
        scope: scope.to_string()
    );

    let log = ctx.open_log().await?;
    let sched = scope.sched(&log, log_type).await?;
    let aggregate = schedlog::aggregate(sched.view(), columns, bucket_secs, reduction, filter).await?;
    handler(&render_aggregate(&aggregate)?);
    Ok(())
}
