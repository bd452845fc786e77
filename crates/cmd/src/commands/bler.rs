// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use schedlog::LogType;

use crate::common::{LogContext, Scope, render_aggregate};

/// BLER command - block error rate per bucket, optionally for one slot
pub async fn bler_command<F>(
    ctx: &LogContext,
    log_type: LogType,
    scope: Scope,
    bucket_secs: f64,
    slot: Option<u32>,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let log = ctx.open_log().await?;
    let sched = scope.sched(&log, log_type).await?;
    let bler = sched.bler(bucket_secs, slot).await?;
    handler(&render_aggregate(&bler)?);
    Ok(())
}
