// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use schedlog::{EventKind, LogType};

use crate::common::{LogContext, Scope, render};

/// Events command - rows flagged as HARQ failure, self-maintained, DTX or
/// lost uplink grant
pub async fn events_command<F>(
    ctx: &LogContext,
    log_type: LogType,
    scope: Scope,
    kind: EventKind,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let log = ctx.open_log().await?;
    let sched = scope.sched(&log, log_type).await?;
    let events = sched.find_events(kind).await?;
    let count = events.num_rows();
    let mut output = render(&[events])?;
    output.push_str(&format!("{count} {kind} events\n"));
    handler(&output);
    Ok(())
}
