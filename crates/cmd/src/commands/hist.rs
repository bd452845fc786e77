// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use schedlog::{LogType, Reduction, ValueFilter};

use crate::common::{LogContext, Scope, render, render_aggregate};

/// Hist command - distinct value counts of one column, overall or per
/// bucket when `bucket_secs` is given
pub async fn hist_command<F>(
    ctx: &LogContext,
    log_type: LogType,
    scope: Scope,
    column: &str,
    ratio: bool,
    bucket_secs: Option<f64>,
    filter: Option<&ValueFilter>,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let log = ctx.open_log().await?;
    let sched = scope.sched(&log, log_type).await?;

    let output = match bucket_secs {
        Some(bucket_secs) => {
            let columns = [column];
            let reduction = Reduction::ValueHistogram { ratio };
            let aggregate =
                schedlog::aggregate(sched.view(), &columns, bucket_secs, reduction, filter).await?;
            render_aggregate(&aggregate)?
        }
        None => {
            let histogram = schedlog::histogram(sched.view(), column, filter).await?;
            let mut output = render(&[histogram.to_record_batch()?])?;
            output.push_str(&format!("total: {}\n", histogram.total()));
            output
        }
    };
    handler(&output);
    Ok(())
}
