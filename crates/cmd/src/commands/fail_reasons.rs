// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Result;
use arrow::array::{StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use schedlog::LogType;

use crate::common::{LogContext, Scope, render};

/// Fail-reasons command - scheduling failure reasons, most frequent first
pub async fn fail_reasons_command<F>(
    ctx: &LogContext,
    log_type: LogType,
    scope: Scope,
    mut handler: F,
) -> Result<()>
where
    F: FnMut(&str),
{
    let log = ctx.open_log().await?;
    let sched = scope.sched(&log, log_type).await?;
    let reasons = sched.fail_reasons().await?;
    if reasons.is_empty() {
        handler(&format!("no scheduling failures for {scope}\n"));
        return Ok(());
    }

    let names: StringArray = reasons.iter().map(|(name, _)| Some(name.as_str())).collect();
    let counts: UInt64Array = reasons.iter().map(|(_, n)| Some(*n)).collect();
    let schema = Schema::new(vec![
        Field::new("reason", DataType::Utf8, false),
        Field::new("count", DataType::UInt64, false),
    ]);
    let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(names), Arc::new(counts)])?;
    handler(&render(&[batch])?);
    Ok(())
}
